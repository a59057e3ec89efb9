//! Hook-side writer: merges one lifecycle event into the state file.
//!
//! Every failure comes back as a [`HookError`] so the caller can log it and
//! still exit cleanly; a hook must never block the assistant.

use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::state::{SessionState, read_state};
use crate::util::truncate_chars;

const POST_TOOL_USE: &str = "PostToolUse";
const PAYLOAD_LOG_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to read hook input")]
    Stdin(#[source] io::Error),
    #[error("hook input is not a JSON object")]
    Input(#[source] serde_json::Error),
    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to lock {path}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode session state")]
    Encode(#[source] serde_json::Error),
    #[error("failed to replace {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// Payload the assistant pipes to a hook command on stdin.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct HookEvent {
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub permission_mode: Option<String>,
    pub hook_event_name: Option<String>,
    pub transcript_path: Option<String>,
    pub tool_name: Option<String>,
}

impl HookEvent {
    pub fn parse(raw: &str) -> Result<Self, HookError> {
        serde_json::from_str(raw).map_err(HookError::Input)
    }

    fn is_post_tool_use(&self) -> bool {
        self.hook_event_name.as_deref() == Some(POST_TOOL_USE)
    }
}

/// Overwrites the session fields wholesale. `last_tool` only moves on a
/// `PostToolUse` that names a tool; otherwise the previous tool stays.
pub fn merge_event(state: &mut SessionState, event: &HookEvent) {
    state.session_id = event.session_id.clone();
    state.cwd = event.cwd.clone();
    state.permission_mode = event.permission_mode.clone();
    state.last_event_name = event.hook_event_name.clone();
    state.transcript_path = event
        .transcript_path
        .clone()
        .filter(|path| !path.trim().is_empty());
    if event.is_post_tool_use()
        && let Some(tool) = event.tool_name.as_deref().filter(|name| !name.trim().is_empty())
    {
        state.last_tool = Some(tool.to_string());
    }
}

/// Read-merge-write under an exclusive lock, replacing the file atomically.
pub fn update_state(state_path: &Path, event: &HookEvent) -> Result<SessionState, HookError> {
    let dir = state_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|source| HookError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let lock_path = state_path.with_extension("lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|source| HookError::Io {
            path: lock_path.clone(),
            source,
        })?;
    lock_file
        .lock_exclusive()
        .map_err(|source| HookError::Lock {
            path: lock_path.clone(),
            source,
        })?;

    let result = write_merged(state_path, dir, event);
    let _ = lock_file.unlock();
    result
}

pub fn run(mut reader: impl Read, state_path: &Path) -> Result<SessionState, HookError> {
    debug!(
        cwd = %env::current_dir().unwrap_or_default().display(),
        state_file = %state_path.display(),
        "hook started"
    );
    let mut raw = String::new();
    reader.read_to_string(&mut raw).map_err(HookError::Stdin)?;
    debug!(
        len = raw.len(),
        payload = truncate_chars(&raw, PAYLOAD_LOG_CHARS),
        "hook input received"
    );

    let event = HookEvent::parse(&raw)?;
    debug!(
        event = event.hook_event_name.as_deref().unwrap_or("unknown"),
        session = event.session_id.as_deref().unwrap_or("unknown"),
        "hook event received"
    );
    update_state(state_path, &event)
}

fn write_merged(state_path: &Path, dir: &Path, event: &HookEvent) -> Result<SessionState, HookError> {
    let mut state = if state_path.exists() {
        read_state(state_path).unwrap_or_else(|err| {
            debug!(error = %err, "discarding unreadable previous state");
            SessionState::default()
        })
    } else {
        SessionState::default()
    };
    merge_event(&mut state, event);

    let mut staged = NamedTempFile::new_in(dir).map_err(|source| HookError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(&mut staged, &state).map_err(HookError::Encode)?;
    staged
        .write_all(b"\n")
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|source| HookError::Io {
            path: staged.path().to_path_buf(),
            source,
        })?;
    staged
        .persist(state_path)
        .map_err(|source| HookError::Persist {
            path: state_path.to_path_buf(),
            source,
        })?;
    Ok(state)
}
