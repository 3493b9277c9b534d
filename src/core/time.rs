use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Source of wall-clock instants.
///
/// Remaining time is derived from wall-clock instants rather than a monotonic
/// timer so that time spent suspended still counts against the deadline.
pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Parses an instant reported by the server.
///
/// The server emits naive timestamps (implicitly UTC) as well as RFC 3339.
pub(crate) fn parse_server_instant(value: &str) -> Option<OffsetDateTime> {
    let trimmed = value.trim();
    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(parsed);
    }
    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Iso8601::DEFAULT) {
        return Some(parsed);
    }
    PrimitiveDateTime::parse(trimmed, &Iso8601::DEFAULT).ok().map(PrimitiveDateTime::assume_utc)
}

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Renders a countdown as `m:ss`.
pub(crate) fn format_remaining(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_naive_server_timestamp_as_utc() {
        let parsed = parse_server_instant("2025-01-02T10:20:30.123456").expect("naive");
        assert_eq!(parsed, datetime!(2025-01-02 10:20:30.123456 UTC));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_server_instant("2025-01-02T13:20:30+03:00").expect("rfc3339");
        assert_eq!(parsed, datetime!(2025-01-02 10:20:30 UTC));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_server_instant("yesterday").is_none());
    }

    #[test]
    fn format_offset_outputs_utc_z() {
        assert_eq!(format_offset(datetime!(2025-01-02 10:20:30 UTC)), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn format_remaining_pads_seconds() {
        assert_eq!(format_remaining(1200), "20:00");
        assert_eq!(format_remaining(65), "1:05");
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(-4), "0:00");
    }
}
