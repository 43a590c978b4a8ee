//! Time utilities for the Cambio rate engine.

use chrono::{DateTime, Utc};

/// A timestamp with timezone (always UTC for Cambio).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a stored timestamp: RFC 3339 first, epoch milliseconds second.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

/// Render a stored timestamp for display.
///
/// Accepts RFC 3339 strings or epoch milliseconds. Returns an empty string
/// for missing or unparseable input; the caller never sees an error.
pub fn format_date(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return String::new();
    };
    parse_timestamp(raw)
        .map(|ts| ts.format("%d %b %Y, %H:%M").to_string())
        .unwrap_or_default()
}
