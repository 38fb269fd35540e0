/// Prefixes of control messages the host injects into the transcript stream.
///
/// Union of every prefix the hook scripts have filtered on over time.
pub const RESERVED_PREFIXES: &[&str] = &[
    "<local-command-",
    "<system-reminder>",
    "<command-name>",
    "<local-command-caveat>",
];

/// Assistant no-op reply emitted for prompts that need no answer.
pub const NO_RESPONSE: &str = "No response requested.";

/// Whether `text` is worth storing as memory.
///
/// Valid iff the trimmed text is non-empty, does not start with a reserved
/// control prefix, and is not the no-op reply.
pub fn is_valid_content(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == NO_RESPONSE {
        return false;
    }
    !RESERVED_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}
