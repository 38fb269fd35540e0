use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{append_jsonl, lock_file, now_rfc3339, read_jsonl};

/// One line of `groups.jsonl`: first sighting of a project under an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntry {
    #[serde(default)]
    pub key_id: Option<String>,
    pub group_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub timestamp: String,
}

/// Aggregated view of every entry sharing a `(keyId, groupId)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub key_id: Option<String>,
    pub name: String,
    pub path: String,
    pub first_seen: String,
    pub last_seen: String,
    pub session_count: u32,
}

/// Append-only log of projects that used EverMem.
pub struct GroupsLog {
    path: PathBuf,
}

impl GroupsLog {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("groups.jsonl"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Record `group_id` for `cwd` unless the `(group_id, key_id)` pair is
    /// already present. Returns the written entry, or `None` when skipped.
    pub fn save(
        &self,
        group_id: &str,
        cwd: &Path,
        key_id: Option<&str>,
    ) -> anyhow::Result<Option<GroupEntry>> {
        let _guard = lock_file(&self.lock_path())?;
        let existing: Vec<GroupEntry> = read_jsonl(&self.path)?;
        if existing
            .iter()
            .any(|e| e.group_id == group_id && e.key_id.as_deref() == key_id)
        {
            return Ok(None);
        }
        let entry = GroupEntry {
            key_id: key_id.map(str::to_string),
            group_id: group_id.to_string(),
            name: cwd
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: cwd.to_string_lossy().into_owned(),
            timestamp: now_rfc3339(),
        };
        append_jsonl(&self.path, &entry)?;
        tracing::debug!(group_id, "recorded new group");
        Ok(Some(entry))
    }

    /// Aggregate the log, newest `lastSeen` first. With `key_id`, only
    /// groups recorded under that key are returned.
    pub fn load(&self, key_id: Option<&str>) -> anyhow::Result<Vec<GroupSummary>> {
        let entries: Vec<GroupEntry> = read_jsonl(&self.path)?;
        Ok(aggregate(entries, key_id))
    }

    pub fn find(&self, group_id: &str, key_id: Option<&str>) -> anyhow::Result<Option<GroupSummary>> {
        Ok(self.load(key_id)?.into_iter().find(|g| g.id == group_id))
    }
}

fn aggregate(entries: Vec<GroupEntry>, key_id: Option<&str>) -> Vec<GroupSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, GroupSummary> = HashMap::new();

    for entry in entries {
        if key_id.is_some() && entry.key_id.as_deref() != key_id {
            continue;
        }
        let composite = format!(
            "{}:{}",
            entry.key_id.as_deref().unwrap_or("none"),
            entry.group_id
        );
        match by_key.get_mut(&composite) {
            Some(group) => {
                group.session_count += 1;
                if entry.timestamp > group.last_seen {
                    group.last_seen = entry.timestamp.clone();
                }
                if entry.timestamp < group.first_seen {
                    group.first_seen = entry.timestamp;
                }
            }
            None => {
                order.push(composite.clone());
                by_key.insert(
                    composite,
                    GroupSummary {
                        id: entry.group_id,
                        key_id: entry.key_id,
                        name: entry.name,
                        path: entry.path,
                        first_seen: entry.timestamp.clone(),
                        last_seen: entry.timestamp,
                        session_count: 1,
                    },
                );
            }
        }
    }

    let mut groups: Vec<GroupSummary> = order
        .into_iter()
        .filter_map(|k| by_key.remove(&k))
        .collect();
    groups.sort_by_key(|g| std::cmp::Reverse(parse_ts(&g.last_seen)));
    groups
}

fn parse_ts(ts: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339).ok()
}
