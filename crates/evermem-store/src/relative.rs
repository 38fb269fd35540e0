use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Compact "time ago" label: `just now`, `5m ago`, `3h ago`, `2d ago`,
/// `1mo ago`. Unparseable input yields `unknown`.
pub fn format_relative(iso: &str, now: OffsetDateTime) -> String {
    let Ok(then) = OffsetDateTime::parse(iso, &Rfc3339) else {
        return "unknown".to_string();
    };
    let minutes = (now - then).whole_minutes();
    let hours = minutes / 60;
    let days = hours / 24;
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 30 {
        format!("{days}d ago")
    } else {
        format!("{}mo ago", days / 30)
    }
}

pub fn format_relative_now(iso: &str) -> String {
    format_relative(iso, OffsetDateTime::now_utc())
}
