//! Formatting helpers shared by query results.

use chrono::{DateTime, Utc};

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else {
        format!("{}d ago", duration.num_days())
    }
}

/// Format an optional timestamp as relative time, or `fallback` if missing.
pub fn format_relative_time_opt(
    ts: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    fallback: &str,
) -> String {
    match ts {
        Some(ts) => format_relative_time(ts, now),
        None => fallback.to_string(),
    }
}

/// Format a future timestamp (e.g., "in 5m"). Past timestamps read "due".
pub fn format_time_until(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = ts.signed_duration_since(now);

    if duration.num_seconds() <= 0 {
        "due".to_string()
    } else if duration.num_seconds() < 60 {
        format!("in {}s", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("in {}m", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("in {}h", duration.num_hours())
    } else {
        format!("in {}d", duration.num_days())
    }
}

/// Span between a past timestamp and now without the "ago" suffix (e.g., "3h").
pub fn format_elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let relative = format_relative_time(since, now);
    relative
        .strip_suffix(" ago")
        .map(str::to_string)
        .unwrap_or(relative)
}

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
