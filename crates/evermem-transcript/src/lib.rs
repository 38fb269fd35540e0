//! Claude Code transcript parsing and Q&A pair extraction.
//!
//! A transcript is an append-only JSONL file. This crate turns the slice of it
//! that belongs to one turn (or the whole file) into validated
//! user/assistant pairs ready to be stored as memories.

mod digest;
mod error;
mod extract;
mod filter;
mod limits;
mod read;
mod record;
mod scan;

pub use digest::{digest_lines, digest_session, SessionDigest};
pub use error::TranscriptError;
pub use extract::{extract_pairs, ExtractMode, ExtractOptions, ExtractStats, Extraction, PairMachine, QaPair};
pub use filter::{is_valid_content, NO_RESPONSE, RESERVED_PREFIXES};
pub use limits::{
    char_prefix, truncate_content, BoundedText, ConcatLimit, Role, Truncated, TruncationLimits,
    DEFAULT_ASSISTANT_CHARS, DEFAULT_CONCAT_CEILING, DEFAULT_MIN_PARTIAL_CHARS, DEFAULT_USER_CHARS,
    HISTORY_CHARS,
};
pub use read::{
    extract_file, extract_turn_end, read_lines, read_turn, read_until, ReadOutcome, RetryPolicy,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY,
};
pub use record::{parse_line, ContentBlock, Message, MessageContent, TranscriptRecord, INTERRUPT_MARKER};
pub use scan::{current_turn_start, ends_with_turn_marker, window_start, BoundaryRule, ScanTarget};
