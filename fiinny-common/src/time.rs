//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC timestamp as an RFC 3339 string with millisecond precision
pub fn now_rfc3339() -> String {
    to_rfc3339(now())
}

/// Render a timestamp the way it is stored on documents
pub fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Convert epoch milliseconds to a UTC timestamp
///
/// Returns `None` for values outside chrono's representable range.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Parse an RFC 3339 string into a UTC timestamp
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_from_epoch_millis() {
        let ts = from_epoch_millis(1_717_236_900_000).unwrap();
        assert_eq!(to_rfc3339(ts), "2024-06-01T10:15:00.000Z");
    }

    #[test]
    fn test_from_epoch_millis_out_of_range() {
        assert!(from_epoch_millis(i64::MAX).is_none());
    }

    #[test]
    fn test_parse_rfc3339_normalizes_offset() {
        let ts = parse_rfc3339("2024-06-01T15:45:00+05:30").unwrap();
        assert_eq!(to_rfc3339(ts), "2024-06-01T10:15:00.000Z");
    }

    #[test]
    fn test_parse_rfc3339_rejects_garbage() {
        assert!(parse_rfc3339("yesterday").is_none());
    }
}
