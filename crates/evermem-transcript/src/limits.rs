use serde::{Deserialize, Serialize};

/// Per-message ceiling for user content sent to the store.
pub const DEFAULT_USER_CHARS: usize = 2_000;
/// Per-message ceiling for assistant content sent to the store.
pub const DEFAULT_ASSISTANT_CHARS: usize = 4_000;
/// Ceiling for bulk history imports, both roles.
pub const HISTORY_CHARS: usize = 10_000;
/// Running ceiling while concatenating assistant text blocks into one pair.
pub const DEFAULT_CONCAT_CEILING: usize = 15_000;
/// A partial block is only appended when more than this much budget remains.
pub const DEFAULT_MIN_PARTIAL_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn char_prefix(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub content: String,
    pub truncated: bool,
    pub original_chars: usize,
}

/// Cut `content` to `max_chars` and append a visible marker naming the
/// original length. Content within the ceiling is returned unchanged.
pub fn truncate_content(content: &str, max_chars: usize) -> Truncated {
    let original_chars = content.chars().count();
    if original_chars <= max_chars {
        return Truncated {
            content: content.to_string(),
            truncated: false,
            original_chars,
        };
    }
    Truncated {
        content: format!(
            "{}\n\n[... truncated, original: {original_chars} chars]",
            char_prefix(content, max_chars)
        ),
        truncated: true,
        original_chars,
    }
}

/// Role-specific per-message ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationLimits {
    pub user_chars: usize,
    pub assistant_chars: usize,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self {
            user_chars: DEFAULT_USER_CHARS,
            assistant_chars: DEFAULT_ASSISTANT_CHARS,
        }
    }
}

impl TruncationLimits {
    /// Same ceiling for both roles (history import).
    pub fn uniform(max_chars: usize) -> Self {
        Self {
            user_chars: max_chars,
            assistant_chars: max_chars,
        }
    }

    pub fn ceiling(&self, role: Role) -> usize {
        match role {
            Role::User => self.user_chars,
            Role::Assistant => self.assistant_chars,
        }
    }

    pub fn apply(&self, role: Role, content: &str) -> Truncated {
        truncate_content(content, self.ceiling(role))
    }
}

/// Accumulation ceiling for multi-block assistant answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatLimit {
    pub ceiling: usize,
    pub min_partial: usize,
}

impl Default for ConcatLimit {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CONCAT_CEILING,
            min_partial: DEFAULT_MIN_PARTIAL_CHARS,
        }
    }
}

/// Text built from blank-line separated blocks that never grows past a
/// [`ConcatLimit`] ceiling. Tracks its length in chars to avoid rescans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedText {
    text: String,
    chars: usize,
}

impl BoundedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Append one block. A block that would overflow the ceiling is cut to the
    /// remaining budget if that budget exceeds `min_partial`, otherwise dropped.
    /// Returns whether anything was appended.
    pub fn push_block(&mut self, block: &str, limit: &ConcatLimit) -> bool {
        if block.is_empty() || self.chars >= limit.ceiling {
            return false;
        }
        let sep = if self.text.is_empty() { "" } else { "\n\n" };
        let added = sep.len() + block.chars().count();
        if self.chars + added <= limit.ceiling {
            self.text.push_str(sep);
            self.text.push_str(block);
            self.chars += added;
            return true;
        }

        let remaining = limit.ceiling - self.chars;
        if remaining <= limit.min_partial {
            return false;
        }
        let joined = format!("{sep}{block}");
        self.text.push_str(char_prefix(&joined, remaining));
        self.chars += remaining;
        true
    }
}
