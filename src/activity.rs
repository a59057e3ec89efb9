use std::collections::{HashMap, HashSet};

use crate::transcript::{EntryKind, TranscriptEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOperation {
    Read,
    Edit,
    Write,
    NotebookEdit,
}

impl FileOperation {
    /// Maps a tool name to the operation and the parameter carrying its path.
    pub fn from_tool(name: &str) -> Option<(Self, &'static str)> {
        match name {
            "Read" => Some((Self::Read, "file_path")),
            "Edit" => Some((Self::Edit, "file_path")),
            "Write" => Some((Self::Write, "file_path")),
            "NotebookEdit" => Some((Self::NotebookEdit, "notebook_path")),
            _ => None,
        }
    }

    /// Reads leave the file contents in the context window.
    pub fn is_in_context(self) -> bool {
        matches!(self, Self::Read)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAccess {
    pub path: String,
    pub operation: FileOperation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivitySummary {
    /// First touch of each path, in transcript order.
    pub files: Vec<FileAccess>,
    /// Every tool invocation name, duplicates included.
    pub tools: Vec<String>,
    pub message_count: usize,
}

impl ActivitySummary {
    pub fn in_context_count(&self) -> usize {
        self.files
            .iter()
            .filter(|access| access.operation.is_in_context())
            .count()
    }

    /// Most used tools first; equal counts keep first-seen order.
    pub fn tool_counts(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for name in &self.tools {
            let count = counts.entry(name.as_str()).or_insert_with(|| {
                order.push(name.as_str());
                0
            });
            *count += 1;
        }

        let mut ranked: Vec<(&str, usize)> = order
            .into_iter()
            .map(|name| (name, counts.get(name).copied().unwrap_or(0)))
            .collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1));
        ranked.truncate(limit);
        ranked
    }
}

pub fn extract_activity(entries: &[TranscriptEntry]) -> ActivitySummary {
    let mut summary = ActivitySummary::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for entry in entries {
        if entry.kind.is_message() {
            summary.message_count += 1;
        }
        if entry.kind != EntryKind::Assistant {
            continue;
        }

        for tool_use in &entry.tool_uses {
            summary.tools.push(tool_use.name.clone());

            let Some((operation, path_key)) = FileOperation::from_tool(&tool_use.name) else {
                continue;
            };
            let Some(path) = tool_use.path_param(path_key) else {
                continue;
            };
            if seen.insert(path) {
                summary.files.push(FileAccess {
                    path: path.to_string(),
                    operation,
                });
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ToolUse;
    use serde_json::json;

    fn tool(name: &str, input: serde_json::Value) -> ToolUse {
        ToolUse {
            name: name.to_string(),
            input,
        }
    }

    fn assistant(tool_uses: Vec<ToolUse>) -> TranscriptEntry {
        TranscriptEntry {
            kind: EntryKind::Assistant,
            usage: None,
            tool_uses,
        }
    }

    fn entry(kind: EntryKind) -> TranscriptEntry {
        TranscriptEntry {
            kind,
            usage: None,
            tool_uses: Vec::new(),
        }
    }

    #[test]
    fn first_touch_wins_for_position_and_operation() {
        let entries = vec![
            assistant(vec![
                tool("Read", json!({"file_path": "/a"})),
                tool("Write", json!({"file_path": "/a"})),
            ]),
            assistant(vec![tool("Read", json!({"file_path": "/b"}))]),
        ];

        let summary = extract_activity(&entries);
        assert_eq!(
            summary.files,
            vec![
                FileAccess {
                    path: "/a".to_string(),
                    operation: FileOperation::Read
                },
                FileAccess {
                    path: "/b".to_string(),
                    operation: FileOperation::Read
                },
            ]
        );
        assert_eq!(summary.in_context_count(), 2);
        assert_eq!(summary.tools, vec!["Read", "Write", "Read"]);
    }

    #[test]
    fn paths_are_never_duplicated() {
        let entries = vec![assistant(vec![
            tool("Edit", json!({"file_path": "/x"})),
            tool("Read", json!({"file_path": "/x"})),
            tool("NotebookEdit", json!({"notebook_path": "/x"})),
            tool("Write", json!({"file_path": "/y"})),
            tool("Edit", json!({"file_path": "/y"})),
        ])];

        let summary = extract_activity(&entries);
        let paths: Vec<&str> = summary.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/x", "/y"]);
        assert_eq!(summary.files[0].operation, FileOperation::Edit);
        assert_eq!(summary.files[1].operation, FileOperation::Write);
        assert_eq!(summary.in_context_count(), 0);
    }

    #[test]
    fn notebook_edits_use_notebook_path() {
        let entries = vec![assistant(vec![
            tool("NotebookEdit", json!({"file_path": "/ignored.ipynb"})),
            tool("NotebookEdit", json!({"notebook_path": "/nb.ipynb"})),
        ])];

        let summary = extract_activity(&entries);
        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.files[0].path, "/nb.ipynb");
        assert_eq!(summary.files[0].operation, FileOperation::NotebookEdit);
        assert_eq!(summary.tools.len(), 2);
    }

    #[test]
    fn empty_or_missing_paths_are_not_files_but_still_tools() {
        let entries = vec![assistant(vec![
            tool("Read", json!({"file_path": ""})),
            tool("Write", json!({})),
            tool("Grep", json!({"pattern": "x", "path": "/src"})),
        ])];

        let summary = extract_activity(&entries);
        assert!(summary.files.is_empty());
        assert_eq!(summary.tools, vec!["Read", "Write", "Grep"]);
    }

    #[test]
    fn message_count_covers_user_and_assistant_only() {
        let entries = vec![
            entry(EntryKind::User),
            entry(EntryKind::Assistant),
            entry(EntryKind::Other),
            entry(EntryKind::User),
        ];
        assert_eq!(extract_activity(&entries).message_count, 3);
    }

    #[test]
    fn tool_use_on_user_entry_is_ignored() {
        let mut user = assistant(vec![tool("Read", json!({"file_path": "/a"}))]);
        user.kind = EntryKind::User;

        let summary = extract_activity(&[user]);
        assert!(summary.tools.is_empty());
        assert!(summary.files.is_empty());
        assert_eq!(summary.message_count, 1);
    }

    #[test]
    fn tool_counts_rank_by_count_then_first_seen() {
        let summary = ActivitySummary {
            tools: ["Bash", "Read", "Grep", "Read", "Grep", "Edit", "Bash"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            ..ActivitySummary::default()
        };

        assert_eq!(
            summary.tool_counts(10),
            vec![("Bash", 2), ("Read", 2), ("Grep", 2), ("Edit", 1)]
        );
        assert_eq!(summary.tool_counts(2), vec![("Bash", 2), ("Read", 2)]);
    }
}
