use std::path::Path;
use std::time::Duration;

use crate::error::TranscriptError;
use crate::extract::{extract_pairs, ExtractOptions, Extraction};
use crate::scan::ends_with_turn_marker;

/// Default attempt count while waiting for the host to flush a turn.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Read the non-blank lines of a transcript file.
pub fn read_lines(path: &Path) -> Result<Vec<String>, TranscriptError> {
    let content = std::fs::read_to_string(path).map_err(|source| TranscriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Bounded fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Single read, no waiting.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub lines: Vec<String>,
    /// Whether the completion predicate held on the returned read.
    pub complete: bool,
    pub attempts: u32,
}

/// Re-read `path` until `is_complete` holds or the budget runs out.
///
/// Exhausting the budget is not an error: the last read is returned with
/// `complete == false`. A missing or unreadable file fails on the first
/// attempt without retrying.
pub fn read_until<F>(
    path: &Path,
    policy: RetryPolicy,
    is_complete: F,
) -> Result<ReadOutcome, TranscriptError>
where
    F: Fn(&[String]) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let lines = read_lines(path)?;
        let complete = is_complete(&lines);
        if complete || attempts >= max_attempts {
            if !complete {
                tracing::debug!(
                    path = %path.display(),
                    attempts,
                    "turn marker not written yet, using last read"
                );
            }
            return Ok(ReadOutcome {
                lines,
                complete,
                attempts,
            });
        }
        std::thread::sleep(policy.delay);
    }
}

/// Read a transcript, waiting briefly for the host to write the closing
/// `turn_duration` marker.
pub fn read_turn(path: &Path, policy: RetryPolicy) -> Result<ReadOutcome, TranscriptError> {
    read_until(path, policy, |lines| ends_with_turn_marker(lines))
}

/// Read the whole file once and extract.
pub fn extract_file(path: &Path, opts: &ExtractOptions) -> Result<Extraction, TranscriptError> {
    let lines = read_lines(path)?;
    Ok(extract_pairs(&lines, opts))
}

/// Turn-end entry point: retry read, then extract.
pub fn extract_turn_end(
    path: &Path,
    opts: &ExtractOptions,
    policy: RetryPolicy,
) -> Result<Extraction, TranscriptError> {
    let outcome = read_turn(path, policy)?;
    Ok(extract_pairs(&outcome.lines, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;

    const USER: &str = r#"{"type":"user","message":{"role":"user","content":"How do I undo a commit?"},"timestamp":"2024-03-02T10:00:00Z"}"#;
    const ASSIST: &str = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"git reset --soft HEAD~1"}]}}"#;
    const TD: &str = r#"{"type":"system","subtype":"turn_duration"}"#;

    fn write_transcript(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        f
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn read_lines_drops_blank_lines() {
        let f = write_transcript(&["", USER, "   ", ASSIST, ""]);
        let lines = read_lines(f.path()).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.jsonl");
        let err = read_turn(&path, fast(5)).unwrap_err();
        assert!(matches!(err, TranscriptError::Read { .. }));
        assert!(err.to_string().contains("nope.jsonl"));
    }

    #[test]
    fn complete_file_returns_after_one_attempt() {
        let f = write_transcript(&[USER, ASSIST, TD]);
        let out = read_turn(f.path(), fast(5)).unwrap();
        assert!(out.complete);
        assert_eq!(out.attempts, 1);
    }

    #[test]
    fn incomplete_file_exhausts_budget_and_returns_last_read() {
        let f = write_transcript(&[USER, ASSIST]);
        let out = read_turn(f.path(), fast(3)).unwrap();
        assert!(!out.complete);
        assert_eq!(out.attempts, 3);
        assert_eq!(out.lines.len(), 2);
    }

    #[test]
    fn predicate_is_reevaluated_each_attempt() {
        let f = write_transcript(&[USER]);
        let calls = Cell::new(0);
        let out = read_until(f.path(), fast(5), |_| {
            calls.set(calls.get() + 1);
            calls.get() == 2
        })
        .unwrap();
        assert!(out.complete);
        assert_eq!(out.attempts, 2);
    }

    #[test]
    fn zero_attempts_still_reads_once() {
        let f = write_transcript(&[USER, ASSIST]);
        let out = read_turn(f.path(), fast(0)).unwrap();
        assert_eq!(out.attempts, 1);
    }

    #[test]
    fn turn_end_extraction_from_file() {
        let f = write_transcript(&[USER, ASSIST, TD]);
        let ex = extract_turn_end(f.path(), &ExtractOptions::current_turn(), fast(2)).unwrap();
        assert_eq!(ex.pairs.len(), 1);
        assert_eq!(ex.pairs[0].assistant, "git reset --soft HEAD~1");
    }

    #[test]
    fn full_file_extraction() {
        let f = write_transcript(&[USER, ASSIST, TD, USER, ASSIST]);
        let ex = extract_file(f.path(), &ExtractOptions::all_pairs()).unwrap();
        assert_eq!(ex.pairs.len(), 2);
        assert_eq!(ex.stats.pairs_emitted, 2);
    }
}
