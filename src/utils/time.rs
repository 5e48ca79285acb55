use chrono::{DateTime, Utc};

/// Formats whole seconds as `MM:SS`. Minutes are not capped at 99.
pub fn format_clock(total_secs: f64) -> String {
    let total = if total_secs.is_finite() && total_secs > 0.0 {
        total_secs.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Seconds elapsed between two epoch-millisecond instants.
pub fn elapsed_secs(start_ms: i64, now_ms: i64) -> f64 {
    (now_ms - start_ms) as f64 / 1000.0
}

/// ISO-8601 timestamp with millisecond precision and a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Filesystem-safe form of an ISO timestamp: `2024-05-01T06-30-12`.
pub fn file_safe_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S").to_string()
}
