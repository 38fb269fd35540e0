use std::path::PathBuf;

use serde_json::Value;

// ── Hook stdin ──

/// The fields EverMem reads from a Claude Code hook payload.
#[derive(Debug, Clone, Default)]
pub struct HookInput {
    pub hook_event_name: String,
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
    pub prompt: String,
    pub reason: String,
    pub source: String,
    pub raw: Value,
}

impl HookInput {
    /// Parse hook stdin. Blank input yields `None`.
    pub fn parse(stdin: &str) -> anyhow::Result<Option<Self>> {
        if stdin.trim().is_empty() {
            return Ok(None);
        }
        let raw: Value = serde_json::from_str(stdin)?;
        Ok(Some(Self {
            hook_event_name: get_str(&raw, "hook_event_name"),
            session_id: get_str(&raw, "session_id"),
            transcript_path: get_str(&raw, "transcript_path"),
            cwd: get_str(&raw, "cwd"),
            prompt: get_str(&raw, "prompt"),
            reason: get_str(&raw, "reason"),
            source: get_str(&raw, "source"),
            raw,
        }))
    }

    /// Hook cwd, falling back to the process cwd.
    pub fn cwd_path(&self) -> PathBuf {
        if self.cwd.is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.cwd)
        }
    }

    pub fn is_resumed(&self) -> bool {
        self.raw
            .get("is_resumed")
            .or_else(|| self.raw.get("isResumed"))
            .and_then(Value::as_bool)
            .unwrap_or(self.source == "resume")
    }
}

/// Get a string field from JSON, trying snake_case first then camelCase.
pub(crate) fn get_str(v: &Value, snake_key: &str) -> String {
    if let Some(s) = v.get(snake_key).and_then(Value::as_str) {
        return s.to_string();
    }
    v.get(snake_to_camel(snake_key))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

pub(crate) fn snake_to_camel(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut upper = false;
    for ch in s.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            result.extend(ch.to_uppercase());
            upper = false;
        } else {
            result.push(ch);
        }
    }
    result
}

pub(crate) fn now_millis() -> i128 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Unix millis of an RFC 3339 timestamp.
pub(crate) fn timestamp_millis(ts: &str) -> Option<i128> {
    time::OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339)
        .ok()
        .map(|t| t.unix_timestamp_nanos() / 1_000_000)
}
