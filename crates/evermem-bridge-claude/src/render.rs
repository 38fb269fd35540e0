//! Text shown to the user and injected into Claude's context.

use std::sync::LazyLock;

use evermem_api::Memory;
use evermem_store::{format_relative, SessionEntry};
use evermem_transcript::{char_prefix, SessionDigest};
use regex::Regex;
use time::OffsetDateTime;

use crate::dispatch::StoreOutcome;

pub const RELEVANT_START: &str = "<relevant-memories>";
pub const RELEVANT_END: &str = "</relevant-memories>";
pub const SESSION_START: &str = "<session-context>";
pub const SESSION_END: &str = "</session-context>";

const LIFECYCLE_MARKERS: &[&str] = &[
    "session start",
    "session end",
    "session initialization",
    "session creation",
    "system log",
    "user exited",
    "user created session",
    "user resumed session",
];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static TWO_WORDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z]+ [a-z]+$").expect("static regex"));
static CJK_DATE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}年\d{1,2}月\d{1,2}日[^:：]*[:：]\s*").expect("static regex")
});
static EN_DATE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s*\d{4}[^:]*:\s*",
    )
    .expect("static regex")
});

/// Cut to `max` chars, appending `...` when anything was dropped.
pub fn ellipsize(text: &str, max: usize) -> String {
    let cut = char_prefix(text, max);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Single-line preview: newlines flattened, trimmed, ellipsized.
pub fn one_line(text: &str, max: usize) -> String {
    ellipsize(text.replace('\n', " ").trim(), max)
}

/// `YYYY-MM-DD` of an RFC 3339 timestamp, or the raw string.
pub fn short_date(ts: &str) -> String {
    match time::OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339) {
        Ok(t) => format!("{:04}-{:02}-{:02}", t.year(), u8::from(t.month()), t.day()),
        Err(_) => ts.to_string(),
    }
}

// ── UserPromptSubmit ──

pub fn relevant_memories(memories: &[Memory]) -> String {
    let mut lines = vec![
        RELEVANT_START.to_string(),
        "The following memories from past sessions are relevant to the user's current task:".to_string(),
        String::new(),
    ];
    for memory in memories {
        lines.push(format!("[{}] {}", memory.kind.as_str(), memory.text));
        lines.push(String::new());
    }
    lines.push(
        "Use this context to inform your response. The user has already seen these memories displayed."
            .to_string(),
    );
    lines.push(RELEVANT_END.to_string());
    lines.join("\n")
}

pub fn recall_message(memories: &[Memory], context: &str, now: OffsetDateTime) -> String {
    let mut lines = vec![format!(
        "📝 Memory Recall by EverMem ({} memories):",
        memories.len()
    )];
    for memory in memories {
        lines.push(format!(
            "  • ({}) {}",
            format_relative(&memory.timestamp, now),
            ellipsize(&memory.text, 80)
        ));
    }
    lines.push(String::new());
    lines.push("Added to context:".to_string());
    lines.push(context.to_string());
    lines.join("\n")
}

// ── SessionStart ──

pub fn session_context(last: Option<&SessionEntry>, recent: &[Memory], now: OffsetDateTime) -> String {
    let mut parts = Vec::new();
    if let Some(last) = last {
        parts.push(format!(
            "Last session ({}, {} turns): {}",
            format_relative(&last.timestamp, now),
            last.turn_count,
            last.summary
        ));
    }
    if !recent.is_empty() {
        let body = recent
            .iter()
            .enumerate()
            .map(|(i, m)| {
                format!(
                    "[{}] ({}) {}\n{}",
                    i + 1,
                    short_date(&m.timestamp),
                    m.subject.as_deref().unwrap_or(""),
                    m.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        parts.push(format!("Recent memories ({}):\n\n{body}", recent.len()));
    }
    format!("{SESSION_START}\n{}\n{SESSION_END}", parts.join("\n\n"))
}

/// Summary worth showing, with tags and command remnants removed.
fn displayable_summary(summary: &str) -> Option<String> {
    let stripped = TAG_RE.replace_all(summary, "");
    let clean = WS_RE.replace_all(&stripped, " ").trim().to_string();
    let valid = clean.chars().count() > 5
        && !clean.starts_with('/')
        && !clean.starts_with("Caveat:")
        && !TWO_WORDS_RE.is_match(&clean);
    valid.then_some(clean)
}

fn is_lifecycle(memory: &Memory) -> bool {
    let subject = memory.subject.as_deref().unwrap_or("").to_lowercase();
    let text = memory.text.to_lowercase();
    LIFECYCLE_MARKERS.iter().any(|m| subject.contains(m))
        || text.contains("[session start]")
        || text.contains("[session end]")
}

fn subject_preview(recent: &[Memory]) -> Option<String> {
    let subjects: Vec<String> = recent
        .iter()
        .filter(|m| !is_lifecycle(m))
        .take(2)
        .map(|m| {
            let subject = m.subject.as_deref().unwrap_or("");
            let subject = CJK_DATE_PREFIX.replace(subject, "");
            let subject = EN_DATE_PREFIX.replace(&subject, "");
            ellipsize(subject.trim(), 40)
        })
        .filter(|s| !s.is_empty())
        .collect();
    (!subjects.is_empty()).then(|| subjects.join(" | "))
}

/// One-line `💡 EverMem:` status for the session banner.
pub fn session_start_line(last: Option<&SessionEntry>, recent: &[Memory], now: OffsetDateTime) -> String {
    let last = last.filter(|s| displayable_summary(&s.summary).is_some());
    let preview = subject_preview(recent);
    match (last, preview) {
        (Some(last), preview) => {
            let mut line = format!(
                "💡 EverMem: Previous session ({}, {} turns)",
                format_relative(&last.timestamp, now),
                last.turn_count
            );
            if let Some(p) = preview {
                line.push_str(&format!(" | {p}"));
            }
            line
        }
        (None, Some(p)) => format!("💡 EverMem: Recent work: {p}"),
        (None, None) if !recent.is_empty() => {
            format!("💡 EverMem: {} cloud memories loaded", recent.len())
        }
        (None, None) => "💡 EverMem: Ready".to_string(),
    }
}

// ── Stop ──

pub fn save_summary(outcomes: &[StoreOutcome]) -> String {
    let failed: Vec<&StoreOutcome> = outcomes.iter().filter(|o| o.error.is_some()).collect();
    if failed.is_empty() {
        let details = outcomes
            .iter()
            .map(|o| {
                let mut s = format!("{}: {}", o.role, o.chars);
                if o.truncated {
                    s.push_str(" (truncated)");
                }
                s
            })
            .collect::<Vec<_>>()
            .join(", ");
        return format!("💾 Memory saved ({}) [{details}]", outcomes.len());
    }
    let mut out = format!(
        "💾 EverMem: {} saved, {} failed\n",
        outcomes.len() - failed.len(),
        failed.len()
    );
    for o in failed {
        out.push_str(&format!(
            "  • {}: ERROR - {}\n",
            o.role.as_str().to_uppercase(),
            o.error.as_deref().unwrap_or("unknown")
        ));
    }
    out
}

// ── SessionEnd ──

pub fn session_end_message(digest: &SessionDigest) -> String {
    let mut parts = vec![format!("{} turns", digest.turn_count)];
    if let Some(d) = digest.duration_label() {
        parts.push(d);
    }
    format!(
        "📝 Session ({}): \"{}\"",
        parts.join(", "),
        ellipsize(&digest.summary, 80)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use evermem_api::MemoryKind;
    use evermem_transcript::Role;
    use time::format_description::well_known::Rfc3339;

    fn now() -> OffsetDateTime {
        OffsetDateTime::parse("2025-06-10T12:00:00Z", &Rfc3339).unwrap()
    }

    fn memory(text: &str, subject: Option<&str>) -> Memory {
        Memory {
            text: text.into(),
            timestamp: "2025-06-10T10:00:00Z".into(),
            kind: MemoryKind::Decision,
            score: 0.8,
            subject: subject.map(str::to_string),
            metadata: serde_json::Value::Null,
        }
    }

    fn last_session(summary: &str) -> SessionEntry {
        SessionEntry {
            session_id: "s0".into(),
            group_id: "g".into(),
            summary: summary.into(),
            turn_count: 4,
            reason: "exit".into(),
            start_time: None,
            end_time: None,
            timestamp: "2025-06-09T12:00:00Z".into(),
        }
    }

    #[test]
    fn relevant_memories_block() {
        let ctx = relevant_memories(&[memory("Use PostgreSQL", None)]);
        assert!(ctx.starts_with(RELEVANT_START));
        assert!(ctx.ends_with(RELEVANT_END));
        assert!(ctx.contains("[decision] Use PostgreSQL"));
    }

    #[test]
    fn recall_lists_relative_times() {
        let msg = recall_message(&[memory(&"x".repeat(100), None)], "CTX", now());
        assert!(msg.starts_with("📝 Memory Recall by EverMem (1 memories):"));
        assert!(msg.contains("(2h ago)"));
        assert!(msg.contains(&format!("{}...", "x".repeat(80))));
        assert!(msg.ends_with("CTX"));
    }

    #[test]
    fn session_context_includes_both_parts() {
        let ctx = session_context(
            Some(&last_session("set up CI")),
            &[memory("body", Some("Subject A"))],
            now(),
        );
        assert!(ctx.contains("Last session (1d ago, 4 turns): set up CI"));
        assert!(ctx.contains("Recent memories (1):"));
        assert!(ctx.contains("[1] (2025-06-10) Subject A\nbody"));
    }

    #[test]
    fn start_line_variants() {
        let last = last_session("Refactor the auth module");
        let work = memory("t", Some("June 9, 2025 afternoon: Migrated database to Postgres 16"));
        let lifecycle = memory("[Session Start] User created session", Some("Session start"));

        let line = session_start_line(Some(&last), &[lifecycle.clone(), work.clone()], now());
        assert_eq!(
            line,
            "💡 EverMem: Previous session (1d ago, 4 turns) | Migrated database to Postgres 16"
        );

        let junk = last_session("<command-name>/clear</command-name>");
        assert_eq!(
            session_start_line(Some(&junk), &[work], now()),
            "💡 EverMem: Recent work: Migrated database to Postgres 16"
        );
        assert_eq!(
            session_start_line(None, &[lifecycle], now()),
            "💡 EverMem: 1 cloud memories loaded"
        );
        assert_eq!(session_start_line(None, &[], now()), "💡 EverMem: Ready");
    }

    #[test]
    fn displayable_summary_rules() {
        assert!(displayable_summary("clear clear").is_none());
        assert!(displayable_summary("/compact").is_none());
        assert!(displayable_summary("Caveat: The messages below").is_none());
        assert_eq!(
            displayable_summary("<b>fix</b>   the\nlogin bug").as_deref(),
            Some("fix the login bug")
        );
    }

    #[test]
    fn save_summary_success_and_partial() {
        let ok = vec![
            StoreOutcome { role: Role::User, chars: 12, truncated: false, error: None },
            StoreOutcome { role: Role::Assistant, chars: 5000, truncated: true, error: None },
        ];
        assert_eq!(
            save_summary(&ok),
            "💾 Memory saved (2) [user: 12, assistant: 5000 (truncated)]"
        );

        let partial = vec![
            StoreOutcome { role: Role::User, chars: 12, truncated: false, error: None },
            StoreOutcome {
                role: Role::Assistant,
                chars: 40,
                truncated: false,
                error: Some("API timeout".into()),
            },
        ];
        let msg = save_summary(&partial);
        assert!(msg.starts_with("💾 EverMem: 1 saved, 1 failed"));
        assert!(msg.contains("ASSISTANT: ERROR - API timeout"));
    }

    #[test]
    fn session_end_line() {
        let digest = SessionDigest {
            summary: "add login | fix tests".into(),
            prompt_count: 2,
            turn_count: 3,
            first_timestamp: Some("2025-06-10T10:00:00Z".into()),
            last_timestamp: Some("2025-06-10T10:42:00Z".into()),
        };
        assert_eq!(
            session_end_message(&digest),
            "📝 Session (3 turns, 42min): \"add login | fix tests\""
        );
    }

    #[test]
    fn helpers() {
        assert_eq!(one_line("a\nb  ", 10), "a b");
        assert_eq!(one_line("abcdef", 3), "abc...");
        assert_eq!(short_date("2024-03-05T23:00:00Z"), "2024-03-05");
        assert_eq!(short_date("nope"), "nope");
    }
}
