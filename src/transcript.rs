use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::usage::UsageRecord;

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("failed to read transcript {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Assistant,
    Other,
}

impl EntryKind {
    fn from_type(typ: Option<&str>) -> Self {
        match typ {
            Some("user") => Self::User,
            Some("assistant") => Self::Assistant,
            _ => Self::Other,
        }
    }

    pub fn is_message(self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub name: String,
    pub input: Value,
}

impl ToolUse {
    /// Non-empty string parameter, e.g. `file_path`.
    pub fn path_param(&self, key: &str) -> Option<&str> {
        self.input
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// One decoded transcript line, reduced to the fields the dashboard reads.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub usage: Option<UsageRecord>,
    pub tool_uses: Vec<ToolUse>,
}

impl TranscriptEntry {
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let kind = EntryKind::from_type(value.get("type").and_then(Value::as_str));
        let message = value.get("message").unwrap_or(&Value::Null);

        let usage = message
            .get("usage")
            .filter(|usage| usage.as_object().is_some_and(|map| !map.is_empty()))
            .map(UsageRecord::from_value);

        let tool_uses = message
            .get("content")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(tool_use_from_item).collect())
            .unwrap_or_default();

        Some(Self {
            kind,
            usage,
            tool_uses,
        })
    }
}

/// Reads every decodable line of the transcript. An absent path or file is
/// an empty transcript; undecodable lines, including a torn final line, are
/// skipped.
pub fn read_transcript(path: Option<&Path>) -> Result<Vec<TranscriptEntry>, TranscriptError> {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(Vec::new());
    };
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(TranscriptError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    parse_lines(BufReader::new(file)).map_err(|source| TranscriptError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_lines(mut reader: impl BufRead) -> io::Result<Vec<TranscriptEntry>> {
    let mut entries = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes = reader.read_until(b'\n', &mut line)?;
        if bytes == 0 {
            break;
        }
        let parsed = match serde_json::from_slice::<Value>(line.trim_ascii()) {
            Ok(value) => value,
            Err(_) => continue,
        };
        if let Some(entry) = TranscriptEntry::from_value(&parsed) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn tool_use_from_item(item: &Value) -> Option<ToolUse> {
    if item.get("type").and_then(Value::as_str) != Some("tool_use") {
        return None;
    }
    Some(ToolUse {
        name: item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        input: item.get("input").cloned().unwrap_or(Value::Null),
    })
}
