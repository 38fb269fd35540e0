use crate::record::{parse_line, TranscriptRecord};

/// Which records close one turn and open the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryRule {
    /// Only `system` / `turn_duration`.
    #[default]
    TurnDuration,
    /// `turn_duration` or `file-history-snapshot`.
    Strict,
}

impl BoundaryRule {
    pub fn is_boundary(self, record: &TranscriptRecord) -> bool {
        match self {
            BoundaryRule::TurnDuration => record.is_turn_duration(),
            BoundaryRule::Strict => record.is_turn_duration() || record.is_file_history_snapshot(),
        }
    }
}

/// Where the extraction window starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    FileStart,
    CurrentTurn(BoundaryRule),
}

/// Index of the first line of the extraction window.
pub fn window_start<S: AsRef<str>>(lines: &[S], target: ScanTarget) -> usize {
    match target {
        ScanTarget::FileStart => 0,
        ScanTarget::CurrentTurn(rule) => current_turn_start(lines, rule),
    }
}

/// Scan backward for the boundary that opens the current (or last complete)
/// turn and return the index just after it, or 0 when there is none.
///
/// Boundaries trailing the last content record are passed over: if the host
/// has already closed the turn, the window is the turn it just closed rather
/// than the empty range after it. Unparseable lines are ignored.
pub fn current_turn_start<S: AsRef<str>>(lines: &[S], rule: BoundaryRule) -> usize {
    let mut seen_content = false;
    for (i, line) in lines.iter().enumerate().rev() {
        let Some(record) = parse_line(line.as_ref()) else {
            continue;
        };
        if rule.is_boundary(&record) {
            if seen_content {
                return i + 1;
            }
        } else {
            seen_content = true;
        }
    }
    0
}

/// Whether the last parseable record is a `turn_duration` marker, i.e. the
/// host has finished writing the turn.
pub fn ends_with_turn_marker<S: AsRef<str>>(lines: &[S]) -> bool {
    lines
        .iter()
        .rev()
        .find_map(|l| parse_line(l.as_ref()))
        .is_some_and(|r| r.is_turn_duration())
}
