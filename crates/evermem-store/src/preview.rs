use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{read_jsonl, write_atomic};

/// One extracted pair staged for review before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRecord {
    pub index: usize,
    pub user: String,
    pub assistant: String,
    pub timestamp: String,
    pub user_length: usize,
    pub assistant_length: usize,
}

impl PreviewRecord {
    pub fn new(index: usize, user: String, assistant: String, timestamp: String) -> Self {
        Self {
            index,
            user_length: user.chars().count(),
            assistant_length: assistant.chars().count(),
            user,
            assistant,
            timestamp,
        }
    }
}

/// One-shot staging file between `history extract` and `history upload`.
pub struct HistoryPreview {
    path: PathBuf,
}

impl HistoryPreview {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("history-preview.jsonl"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the preview with `records`.
    pub fn write(&self, records: &[PreviewRecord]) -> anyhow::Result<()> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        write_atomic(&self.path, buf.as_bytes())
    }

    pub fn read(&self) -> anyhow::Result<Vec<PreviewRecord>> {
        if !self.exists() {
            anyhow::bail!(
                "no history preview at {}; run `evermem history extract` first",
                self.path.display()
            );
        }
        read_jsonl(&self.path)
    }

    pub fn remove(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_count_chars() {
        let r = PreviewRecord::new(1, "héllo".into(), "wörld!".into(), "t".into());
        assert_eq!(r.user_length, 5);
        assert_eq!(r.assistant_length, 6);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["userLength"], 5);
        assert_eq!(json["assistantLength"], 6);
    }

    #[test]
    fn write_read_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let preview = HistoryPreview::new(tmp.path());
        assert!(preview.read().is_err());

        let records = vec![
            PreviewRecord::new(1, "q1".into(), "a1".into(), "2025-01-01T00:00:00Z".into()),
            PreviewRecord::new(2, "q2".into(), "a2".into(), "2025-01-01T00:01:00Z".into()),
        ];
        preview.write(&records).unwrap();
        assert_eq!(preview.read().unwrap(), records);

        preview.remove().unwrap();
        assert!(!preview.exists());
        // removing twice is fine
        preview.remove().unwrap();
    }
}
