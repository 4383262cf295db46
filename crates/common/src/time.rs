//! RFC 3339 timestamp helpers.
//!
//! Persisted records carry UTC timestamps as RFC 3339 strings with second
//! precision. An absent timestamp is written as an empty string.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp, or the empty string for `None`
pub fn format_rfc3339(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => String::new(),
    }
}

/// Parse an RFC 3339 string into UTC; the empty string yields `None`
pub fn parse_rfc3339(value: &str) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value).map(|ts| Some(ts.with_timezone(&Utc)))
}
