use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TranscriptError;
use crate::filter::is_valid_content;
use crate::limits::char_prefix;
use crate::read::read_lines;
use crate::record::parse_line;

const MAX_PROMPTS: usize = 5;
const MAX_PROMPT_CHARS: usize = 50;
const MAX_SUMMARY_CHARS: usize = 300;
const MIN_PROMPT_CHARS: usize = 3;
const EMPTY_SUMMARY: &str = "Session with no text prompts";

/// Cheap, model-free summary of a whole session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDigest {
    pub summary: String,
    pub prompt_count: usize,
    pub turn_count: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

impl SessionDigest {
    /// Human duration between first and last timestamp: `<1min`, `42min`,
    /// `2h`, `1h5m`. `None` when either end is missing or unparseable.
    pub fn duration_label(&self) -> Option<String> {
        use time::format_description::well_known::Rfc3339;
        let first = time::OffsetDateTime::parse(self.first_timestamp.as_deref()?, &Rfc3339).ok()?;
        let last = time::OffsetDateTime::parse(self.last_timestamp.as_deref()?, &Rfc3339).ok()?;
        let minutes = (last - first).whole_minutes();
        Some(if minutes < 1 {
            "<1min".to_string()
        } else if minutes < 60 {
            format!("{minutes}min")
        } else if minutes % 60 == 0 {
            format!("{}h", minutes / 60)
        } else {
            format!("{}h{}m", minutes / 60, minutes % 60)
        })
    }
}

pub fn digest_lines<S: AsRef<str>>(lines: &[S]) -> SessionDigest {
    let mut prompts: Vec<String> = Vec::new();
    let mut turn_count = 0;
    let mut first_timestamp = None;
    let mut last_timestamp = None;

    for record in lines.iter().filter_map(|l| parse_line(l.as_ref())) {
        if let Some(ts) = &record.timestamp {
            if first_timestamp.is_none() {
                first_timestamp = Some(ts.clone());
            }
            last_timestamp = Some(ts.clone());
        }
        if record.is_turn_duration() {
            turn_count += 1;
        }
        if let Some(question) = record.user_question() {
            let trimmed = question.trim();
            if is_valid_content(trimmed)
                && trimmed.chars().count() > MIN_PROMPT_CHARS
                && !prompts.iter().any(|p| p == trimmed)
            {
                prompts.push(trimmed.to_string());
            }
        }
    }

    let selected: Vec<String> = prompts
        .iter()
        .take(MAX_PROMPTS)
        .map(|p| {
            let cut = char_prefix(p, MAX_PROMPT_CHARS);
            if cut.len() < p.len() {
                format!("{cut}...")
            } else {
                p.clone()
            }
        })
        .collect();
    let joined = if selected.is_empty() {
        EMPTY_SUMMARY.to_string()
    } else {
        selected.join(" | ")
    };

    SessionDigest {
        summary: char_prefix(&joined, MAX_SUMMARY_CHARS).to_string(),
        prompt_count: prompts.len(),
        turn_count,
        first_timestamp,
        last_timestamp,
    }
}

pub fn digest_session(path: &Path) -> Result<SessionDigest, TranscriptError> {
    Ok(digest_lines(&read_lines(path)?))
}
