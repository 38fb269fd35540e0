use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{append_jsonl, read_jsonl};

/// One line of `sessions.jsonl`, written when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub session_id: String,
    pub group_id: String,
    pub summary: String,
    pub turn_count: usize,
    #[serde(default = "unknown_reason")]
    pub reason: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub timestamp: String,
}

fn unknown_reason() -> String {
    "unknown".to_string()
}

pub struct SessionsLog {
    path: PathBuf,
}

impl SessionsLog {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("sessions.jsonl"),
        }
    }

    pub fn append(&self, entry: &SessionEntry) -> anyhow::Result<()> {
        append_jsonl(&self.path, entry)
    }

    pub fn contains_session(&self, session_id: &str) -> anyhow::Result<bool> {
        let entries: Vec<SessionEntry> = read_jsonl(&self.path)?;
        Ok(entries.iter().any(|e| e.session_id == session_id))
    }

    /// Append `entry` unless its session was already summarized.
    pub fn append_once(&self, entry: &SessionEntry) -> anyhow::Result<bool> {
        if self.contains_session(&entry.session_id)? {
            return Ok(false);
        }
        self.append(entry)?;
        Ok(true)
    }

    /// Most recently appended summary for `group_id`.
    pub fn last_for_group(&self, group_id: &str) -> anyhow::Result<Option<SessionEntry>> {
        let entries: Vec<SessionEntry> = read_jsonl(&self.path)?;
        Ok(entries.into_iter().rev().find(|e| e.group_id == group_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, group: &str, summary: &str) -> SessionEntry {
        SessionEntry {
            session_id: id.into(),
            group_id: group.into(),
            summary: summary.into(),
            turn_count: 3,
            reason: "exit".into(),
            start_time: None,
            end_time: None,
            timestamp: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn append_once_and_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let log = SessionsLog::new(tmp.path());
        assert!(log.last_for_group("g").unwrap().is_none());
        assert!(log.append_once(&session("s1", "g", "first")).unwrap());
        assert!(!log.append_once(&session("s1", "g", "again")).unwrap());
        log.append(&session("s2", "other", "elsewhere")).unwrap();
        log.append(&session("s3", "g", "latest")).unwrap();

        assert!(log.contains_session("s2").unwrap());
        let last = log.last_for_group("g").unwrap().unwrap();
        assert_eq!(last.summary, "latest");
    }

    #[test]
    fn missing_reason_defaults() {
        let e: SessionEntry = serde_json::from_str(
            r#"{"sessionId":"s","groupId":"g","summary":"x","turnCount":1,"timestamp":"t"}"#,
        )
        .unwrap();
        assert_eq!(e.reason, "unknown");
    }
}
