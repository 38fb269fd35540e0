use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Synthetic text block Claude Code writes when the user cancels a turn.
pub const INTERRUPT_MARKER: &str = "[Request interrupted by user]";

/// One parsed transcript line.
///
/// Only the fields the extractor reads are modelled. Every field is lenient:
/// a value of the wrong JSON type is treated as absent instead of failing the
/// whole record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TranscriptRecord {
    #[serde(rename = "type", default, deserialize_with = "lenient_str")]
    pub record_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient_message")]
    pub message: Option<Message>,
    #[serde(default, deserialize_with = "lenient_str")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "lenient_str")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// `message.content` is either a bare string (a typed user prompt) or a list
/// of content blocks (assistant output, tool results, interrupt markers).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

/// A single content block. Only `Text` carries data the extractor keeps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawBlock")]
pub enum ContentBlock {
    Text(String),
    ToolUse,
    ToolResult,
    Thinking,
    Unknown,
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(rename = "type", default, deserialize_with = "lenient_str")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_str")]
    text: Option<String>,
}

impl From<RawBlock> for ContentBlock {
    fn from(raw: RawBlock) -> Self {
        match raw.kind.as_deref() {
            Some("text") => ContentBlock::Text(raw.text.unwrap_or_default()),
            Some("tool_use") => ContentBlock::ToolUse,
            Some("tool_result") => ContentBlock::ToolResult,
            Some("thinking") => ContentBlock::Thinking,
            _ => ContentBlock::Unknown,
        }
    }
}

fn lenient_str<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_message<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Message>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(v @ Value::Object(_)) => serde_json::from_value(v).ok(),
        _ => None,
    })
}

/// Parse one raw transcript line. Blank lines and anything that is not a
/// JSON object yield `None`; callers treat that as noise.
pub fn parse_line(line: &str) -> Option<TranscriptRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line).ok()? {
        v @ Value::Object(_) => serde_json::from_value(v).ok(),
        _ => None,
    }
}

impl TranscriptRecord {
    fn is_type(&self, t: &str) -> bool {
        self.record_type.as_deref() == Some(t)
    }

    fn content(&self) -> Option<&MessageContent> {
        self.message.as_ref().and_then(|m| m.content.as_ref())
    }

    fn blocks(&self) -> Option<&[ContentBlock]> {
        match self.content() {
            Some(MessageContent::Blocks(blocks)) => Some(blocks),
            _ => None,
        }
    }

    /// `system` / `turn_duration`: written by the host after a turn completes.
    pub fn is_turn_duration(&self) -> bool {
        self.is_type("system") && self.subtype.as_deref() == Some("turn_duration")
    }

    pub fn is_file_history_snapshot(&self) -> bool {
        self.is_type("file-history-snapshot")
    }

    /// The prompt text if this record is a typed user question.
    ///
    /// Tool results are also `user` records, but their content is a block
    /// list, so only plain-string content opens a new Q&A pair.
    pub fn user_question(&self) -> Option<&str> {
        if !self.is_type("user") {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.role.as_deref() != Some("user") {
            return None;
        }
        match message.content.as_ref()? {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_interrupt_marker(&self) -> bool {
        self.is_type("user")
            && self.blocks().is_some_and(|blocks| {
                blocks
                    .iter()
                    .any(|b| matches!(b, ContentBlock::Text(t) if t == INTERRUPT_MARKER))
            })
    }

    /// All `text` blocks of an assistant record joined by a blank line.
    /// `None` when the record is not assistant output or has no text block.
    pub fn assistant_text(&self) -> Option<String> {
        if !self.is_type("assistant") {
            return None;
        }
        let texts: Vec<&str> = self
            .blocks()?
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        if texts.is_empty() {
            return None;
        }
        Some(texts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_question() {
        let rec = parse_line(
            r#"{"type":"user","message":{"role":"user","content":"What DB?"},"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(rec.user_question(), Some("What DB?"));
        assert_eq!(rec.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert!(!rec.is_interrupt_marker());
    }

    #[test]
    fn tool_result_is_not_a_question() {
        let rec = parse_line(
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
        )
        .unwrap();
        assert_eq!(rec.user_question(), None);
        assert!(!rec.is_interrupt_marker());
    }

    #[test]
    fn interrupt_marker_requires_block_list() {
        let blocks = parse_line(
            r#"{"type":"user","message":{"role":"user","content":[{"type":"text","text":"[Request interrupted by user]"}]}}"#,
        )
        .unwrap();
        assert!(blocks.is_interrupt_marker());

        let plain = parse_line(
            r#"{"type":"user","message":{"role":"user","content":"[Request interrupted by user]"}}"#,
        )
        .unwrap();
        assert!(!plain.is_interrupt_marker());
        assert_eq!(plain.user_question(), Some(INTERRUPT_MARKER));
    }

    #[test]
    fn assistant_text_joins_text_blocks_only() {
        let rec = parse_line(
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"one"},{"type":"tool_use","id":"x","name":"Bash","input":{}},{"type":"text","text":"two"}]}}"#,
        )
        .unwrap();
        assert_eq!(rec.assistant_text().as_deref(), Some("one\n\ntwo"));
    }

    #[test]
    fn assistant_without_text_yields_none() {
        let rec = parse_line(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"x","name":"Read"}]}}"#,
        )
        .unwrap();
        assert_eq!(rec.assistant_text(), None);
    }

    #[test]
    fn turn_boundaries() {
        let td = parse_line(r#"{"type":"system","subtype":"turn_duration","durationMs":12}"#).unwrap();
        assert!(td.is_turn_duration());
        let other = parse_line(r#"{"type":"system","subtype":"init"}"#).unwrap();
        assert!(!other.is_turn_duration());
        let snap = parse_line(r#"{"type":"file-history-snapshot","messageId":"m"}"#).unwrap();
        assert!(snap.is_file_history_snapshot());
    }

    #[test]
    fn garbage_and_blank_lines_are_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line("[1,2,3]").is_none());
        assert!(parse_line(r#"{"type":"user""#).is_none());
        assert!(parse_line(r#""user""#).is_none());
    }

    #[test]
    fn array_line_is_not_read_positionally() {
        let line = r#"["user",null,{"role":"user","content":"smuggled question"},"2024-01-01T00:00:00Z"]"#;
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn wrong_field_types_are_tolerated() {
        let rec = parse_line(r#"{"type":"user","message":"hello","timestamp":17}"#).unwrap();
        assert_eq!(rec.record_type.as_deref(), Some("user"));
        assert!(rec.message.is_none());
        assert!(rec.timestamp.is_none());

        let odd = parse_line(r#"{"type":"assistant","message":{"content":["raw",1]}}"#).unwrap();
        assert!(matches!(
            odd.message.unwrap().content,
            Some(MessageContent::Other(_))
        ));
    }
}
