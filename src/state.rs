//! Session snapshot written by the hook collaborator and read by the monitor.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder shown for any key the hook writer did not provide.
pub const MISSING: &str = "N/A";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("state file {path} is not a complete JSON object")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StateError {
    /// A decode failure usually means the writer is mid-write.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Decode { .. } => true,
            Self::Io { source, .. } => source.kind() != io::ErrorKind::PermissionDenied,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(
        rename = "hook_event_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tool: Option<String>,
    /// Stamped by the monitor when the snapshot is read; never persisted.
    #[serde(skip)]
    pub timestamp: Option<String>,
}

impl SessionState {
    pub fn session_id(&self) -> &str {
        display_or_missing(self.session_id.as_deref())
    }

    pub fn cwd(&self) -> &str {
        display_or_missing(self.cwd.as_deref())
    }

    pub fn permission_mode(&self) -> &str {
        display_or_missing(self.permission_mode.as_deref())
    }

    pub fn last_event_name(&self) -> &str {
        display_or_missing(self.last_event_name.as_deref())
    }

    pub fn timestamp(&self) -> &str {
        display_or_missing(self.timestamp.as_deref())
    }

    pub fn last_tool(&self) -> Option<&str> {
        non_empty(self.last_tool.as_deref())
    }

    /// Working directory usable as a path prefix, if the writer supplied one.
    pub fn cwd_prefix(&self) -> Option<&str> {
        non_empty(self.cwd.as_deref()).filter(|cwd| *cwd != MISSING)
    }

    pub fn transcript_path(&self) -> Option<&Path> {
        non_empty(self.transcript_path.as_deref()).map(Path::new)
    }
}

pub fn read_state(path: &Path) -> Result<SessionState, StateError> {
    let raw = fs::read(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| StateError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Modification time of the state file, `None` while it does not exist.
pub fn state_modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn display_or_missing(value: Option<&str>) -> &str {
    non_empty(value).unwrap_or(MISSING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_complete_state_file() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("state.json");
        fs::write(
            &path,
            r#"{"session_id":"abc","cwd":"/repo","permission_mode":"default","hook_event_name":"PostToolUse","transcript_path":"/t.jsonl","last_tool":"Read"}"#,
        )
        .expect("write");

        let state = read_state(&path).expect("state");
        assert_eq!(state.session_id(), "abc");
        assert_eq!(state.last_event_name(), "PostToolUse");
        assert_eq!(state.last_tool(), Some("Read"));
        assert_eq!(state.transcript_path(), Some(Path::new("/t.jsonl")));
        assert_eq!(state.timestamp(), MISSING);
    }

    #[test]
    fn absent_keys_display_as_placeholder() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("state.json");
        fs::write(&path, r#"{"transcript_path":""}"#).expect("write");

        let state = read_state(&path).expect("state");
        assert_eq!(state.session_id(), MISSING);
        assert_eq!(state.cwd(), MISSING);
        assert_eq!(state.permission_mode(), MISSING);
        assert_eq!(state.last_tool(), None);
        assert_eq!(state.transcript_path(), None);
        assert_eq!(state.cwd_prefix(), None);
    }

    #[test]
    fn torn_write_is_a_transient_decode_error() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("state.json");
        fs::write(&path, r#"{"session_id":"ab"#).expect("write");

        let err = read_state(&path).expect_err("torn");
        assert!(matches!(err, StateError::Decode { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn permission_denied_is_not_transient() {
        let err = StateError::Io {
            path: PathBuf::from("state.json"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_file_has_no_modified_time() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("absent.json");
        assert!(state_modified(&path).is_none());
        assert!(matches!(read_state(&path), Err(StateError::Io { .. })));
    }

    #[test]
    fn timestamp_is_never_persisted() {
        let state = SessionState {
            session_id: Some("s".to_string()),
            timestamp: Some("2026-01-01 00:00:00".to_string()),
            ..SessionState::default()
        };
        let json = serde_json::to_string(&state).expect("json");
        assert_eq!(json, r#"{"session_id":"s"}"#);
    }
}
