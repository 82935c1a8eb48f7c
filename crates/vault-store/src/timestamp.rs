//! Timestamp formatting shared by all tables.
//!
//! Timestamps are stored as RFC 3339 UTC text with millisecond precision,
//! e.g. `2024-05-01T12:00:00.000Z`. SQLite's `strftime` and chrono produce the
//! same shape, so values written by either compare lexically.

use chrono::{DateTime, SecondsFormat, Utc};

/// SQL expression for the current time in the stored format.
pub(crate) const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// The current time in the stored format.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Converts Unix milliseconds, as reported by the agency, to the stored
/// format. Returns `None` for values chrono cannot represent.
pub fn from_millis(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}
