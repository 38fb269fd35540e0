use serde::{Deserialize, Serialize};

use crate::filter::is_valid_content;
use crate::limits::{BoundedText, ConcatLimit};
use crate::record::{parse_line, TranscriptRecord};
use crate::scan::{window_start, BoundaryRule, ScanTarget};

/// Emission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Every completed pair in the file (bulk import, preview).
    AllPairs,
    /// Only the last completed pair of the most recent turn (Stop hook).
    CurrentTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub mode: ExtractMode,
    pub boundary: BoundaryRule,
    pub concat: ConcatLimit,
}

impl ExtractOptions {
    pub fn all_pairs() -> Self {
        Self {
            mode: ExtractMode::AllPairs,
            boundary: BoundaryRule::TurnDuration,
            concat: ConcatLimit::default(),
        }
    }

    pub fn current_turn() -> Self {
        Self {
            mode: ExtractMode::CurrentTurn,
            ..Self::all_pairs()
        }
    }

    fn scan_target(&self) -> ScanTarget {
        match self.mode {
            ExtractMode::AllPairs => ScanTarget::FileStart,
            ExtractMode::CurrentTurn => ScanTarget::CurrentTurn(self.boundary),
        }
    }
}

/// One reconstructed user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub user: String,
    pub assistant: String,
    pub timestamp: String,
}

impl QaPair {
    pub fn user_chars(&self) -> usize {
        self.user.chars().count()
    }

    pub fn assistant_chars(&self) -> usize {
        self.assistant.chars().count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Non-blank lines in the extraction window.
    pub lines_scanned: usize,
    /// Lines in the window that were not a JSON object.
    pub lines_skipped: usize,
    pub pairs_emitted: usize,
    pub interrupted: usize,
    pub system_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub pairs: Vec<QaPair>,
    pub stats: ExtractStats,
}

impl Extraction {
    /// The pair current-turn callers store, if any.
    pub fn last_pair(&self) -> Option<&QaPair> {
        self.pairs.last()
    }
}

#[derive(Debug)]
struct OpenPair {
    user: String,
    assistant: BoundedText,
    timestamp: Option<String>,
}

#[derive(Debug)]
enum PairState {
    NoActivePair,
    AwaitingAssistant(OpenPair),
    Accumulating(OpenPair),
}

/// Q&A state machine over records in file order.
pub struct PairMachine {
    concat: ConcatLimit,
    state: PairState,
    pairs: Vec<QaPair>,
    stats: ExtractStats,
}

impl PairMachine {
    pub fn new(concat: ConcatLimit) -> Self {
        Self {
            concat,
            state: PairState::NoActivePair,
            pairs: Vec::new(),
            stats: ExtractStats::default(),
        }
    }

    pub fn feed(&mut self, record: &TranscriptRecord) {
        if let Some(question) = record.user_question() {
            self.close_open_pair();
            self.state = PairState::AwaitingAssistant(OpenPair {
                user: question.to_string(),
                assistant: BoundedText::default(),
                timestamp: record.timestamp.clone(),
            });
        } else if record.is_interrupt_marker() {
            if !matches!(self.state, PairState::NoActivePair) {
                self.stats.interrupted += 1;
                tracing::debug!("discarding interrupted pair");
            }
            self.state = PairState::NoActivePair;
        } else if let Some(text) = record.assistant_text() {
            let state = std::mem::replace(&mut self.state, PairState::NoActivePair);
            self.state = match state {
                PairState::NoActivePair => PairState::NoActivePair,
                PairState::AwaitingAssistant(mut pair) | PairState::Accumulating(mut pair) => {
                    pair.assistant.push_block(&text, &self.concat);
                    PairState::Accumulating(pair)
                }
            };
        }
    }

    fn close_open_pair(&mut self) {
        let pair = match std::mem::replace(&mut self.state, PairState::NoActivePair) {
            PairState::NoActivePair => return,
            PairState::AwaitingAssistant(pair) | PairState::Accumulating(pair) => pair,
        };
        if is_valid_content(&pair.user) && is_valid_content(pair.assistant.as_str()) {
            self.pairs.push(QaPair {
                user: pair.user,
                assistant: pair.assistant.into_string(),
                timestamp: resolve_timestamp(pair.timestamp.as_deref()),
            });
        } else {
            self.stats.system_skipped += 1;
            tracing::debug!("skipping pair without valid user/assistant content");
        }
    }

    pub fn finish(mut self) -> Extraction {
        self.close_open_pair();
        self.stats.pairs_emitted = self.pairs.len();
        Extraction {
            pairs: self.pairs,
            stats: self.stats,
        }
    }
}

/// RFC 3339 timestamp of the triggering user record, or now when the record
/// has none or it does not parse.
fn resolve_timestamp(ts: Option<&str>) -> String {
    use time::format_description::well_known::Rfc3339;
    if let Some(ts) = ts {
        if time::OffsetDateTime::parse(ts, &Rfc3339).is_ok() {
            return ts.to_string();
        }
    }
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Reconstruct Q&A pairs from raw transcript lines.
///
/// Never fails: unparseable lines are counted in `lines_skipped` and
/// otherwise ignored.
pub fn extract_pairs<S: AsRef<str>>(lines: &[S], opts: &ExtractOptions) -> Extraction {
    let start = window_start(lines, opts.scan_target());
    let mut machine = PairMachine::new(opts.concat);
    let mut lines_scanned = 0;
    let mut lines_skipped = 0;

    for line in &lines[start..] {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        lines_scanned += 1;
        match parse_line(line) {
            Some(record) => machine.feed(&record),
            None => lines_skipped += 1,
        }
    }

    let mut extraction = machine.finish();
    extraction.stats.lines_scanned = lines_scanned;
    extraction.stats.lines_skipped = lines_skipped;

    if opts.mode == ExtractMode::CurrentTurn && extraction.pairs.len() > 1 {
        let last = extraction.pairs.split_off(extraction.pairs.len() - 1);
        extraction.pairs = last;
        extraction.stats.pairs_emitted = 1;
    }
    extraction
}
