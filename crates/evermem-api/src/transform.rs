use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Local category a remote memory type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Implementation,
    Preference,
    Decision,
    Learning,
}

impl MemoryKind {
    pub fn from_api_type(api_type: &str) -> Self {
        match api_type {
            "profile" => MemoryKind::Preference,
            "foresight" => MemoryKind::Decision,
            "event_log" => MemoryKind::Learning,
            _ => MemoryKind::Implementation,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Implementation => "implementation",
            MemoryKind::Preference => "preference",
            MemoryKind::Decision => "decision",
            MemoryKind::Learning => "learning",
        }
    }
}

/// A memory as the hooks, MCP server and CLI consume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub text: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

fn str_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn memory_from_item(item: &Value, api_type: &str, score: f64) -> Memory {
    let text = str_field(item, &["content", "text"])
        .map(str::to_string)
        .unwrap_or_else(|| item.to_string());
    Memory {
        timestamp: str_field(item, &["created_at", "timestamp"])
            .map(str::to_string)
            .unwrap_or_else(evermem_store::now_rfc3339),
        kind: MemoryKind::from_api_type(api_type),
        score,
        subject: str_field(item, &["subject", "title"]).map(str::to_string),
        metadata: item.get("metadata").cloned().unwrap_or_else(|| Value::Object(Default::default())),
        text,
    }
}

/// Flatten a search response into memories sorted by score, best first.
///
/// `result.memories` is a list of `{type: [item, ...]}` groups and
/// `result.scores` mirrors it with numbers. Anything else yields an empty
/// list.
pub fn transform_search_results(response: &Value) -> Vec<Memory> {
    let Some(groups) = response.pointer("/result/memories").and_then(Value::as_array) else {
        return Vec::new();
    };
    let scores = response.pointer("/result/scores").and_then(Value::as_array);

    let mut memories = Vec::new();
    for (i, group) in groups.iter().enumerate() {
        let Some(group) = group.as_object() else {
            continue;
        };
        let group_scores = scores.and_then(|s| s.get(i));
        for (api_type, items) in group {
            let Some(items) = items.as_array() else {
                continue;
            };
            let type_scores = group_scores
                .and_then(|g| g.get(api_type))
                .and_then(Value::as_array);
            for (j, item) in items.iter().enumerate() {
                let score = type_scores
                    .and_then(|s| s.get(j))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                memories.push(memory_from_item(item, api_type, score));
            }
        }
    }
    memories.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    memories
}

/// Flatten a list response into memories, newest first.
///
/// The API pages oldest to newest; items are reversed before the stable sort
/// so equal or unparseable timestamps still come out newest first.
pub fn transform_list_results(response: &Value) -> Vec<Memory> {
    let items = response
        .pointer("/result/memories")
        .and_then(Value::as_array)
        .or_else(|| response.pointer("/result/episodic_memory").and_then(Value::as_array));
    let Some(items) = items else {
        return Vec::new();
    };

    let mut memories: Vec<Memory> = items
        .iter()
        .rev()
        .filter(|item| item.is_object())
        .map(|item| {
            let api_type = str_field(item, &["memory_type", "type"]).unwrap_or("episodic_memory");
            let mut memory = memory_from_item(item, api_type, 0.0);
            if memory.subject.is_none() {
                memory.subject = Some(derive_subject(&memory.text));
            }
            memory
        })
        .collect();
    memories.sort_by_key(|m| std::cmp::Reverse(parse_ts(&m.timestamp)));
    memories
}

fn derive_subject(text: &str) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    evermem_transcript::char_prefix(first_line, 80).to_string()
}

fn parse_ts(ts: &str) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339).ok()
}
