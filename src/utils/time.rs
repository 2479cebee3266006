//! Time utility functions

use chrono::{DateTime, Utc};

/// Nanoseconds since Unix epoch to a UTC datetime. Values chrono cannot
/// represent collapse to the epoch with a warning.
pub fn nanos_to_datetime(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec).unwrap_or_else(|| {
        tracing::warn!(nanos, "Timestamp out of range, using epoch");
        DateTime::UNIX_EPOCH
    })
}

/// Current wall-clock time in nanoseconds since Unix epoch
pub fn now_nanos() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0).max(0) as u64
}

/// Parse an RFC 3339 / ISO 8601 timestamp into nanoseconds since Unix epoch.
/// Returns None for unparseable input so callers can fall back to the
/// record-level timestamp.
pub fn parse_rfc3339_nanos(ts: &str) -> Option<u64> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .and_then(|dt| dt.with_timezone(&Utc).timestamp_nanos_opt())
        .map(|n| n.max(0) as u64)
}

/// Format the hour bucket of a timestamp as `YYYY-MM-DDTHH` (UTC).
pub fn iso_hour(nanos: u64) -> String {
    nanos_to_datetime(nanos).format("%Y-%m-%dT%H").to_string()
}
