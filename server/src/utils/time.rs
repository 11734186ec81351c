//! Time conversion helpers

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Convert nanoseconds since Unix epoch to `DateTime<Utc>`.
///
/// Returns `None` for zero (unset in OTLP) or values chrono cannot represent.
pub fn nanos_to_datetime(nanos: u64) -> Option<DateTime<Utc>> {
    if nanos == 0 {
        return None;
    }
    let secs = i64::try_from(nanos / 1_000_000_000).ok()?;
    let nsecs = (nanos % 1_000_000_000) as u32;
    Utc.timestamp_opt(secs, nsecs).single()
}

/// Format a timestamp as RFC 3339 with microsecond precision
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_nanos_to_datetime_known_value() {
        // 2024-01-01 00:00:00 UTC
        let dt = nanos_to_datetime(1_704_067_200_u64 * 1_000_000_000).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
    }

    #[test]
    fn test_nanos_to_datetime_zero_is_none() {
        assert!(nanos_to_datetime(0).is_none());
    }

    #[test]
    fn test_to_iso_micros() {
        let dt = nanos_to_datetime(1_704_067_200_123_456_789).unwrap();
        assert_eq!(to_iso(&dt), "2024-01-01T00:00:00.123456Z");
    }
}
