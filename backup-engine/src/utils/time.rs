//! Timestamp parsing and normalization.

use super::errors::{BackupError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use std::time::SystemTime;

/// Format used when listing versions for a human reader.
pub const DISPLAY_FORMAT: &str = "%d.%m.%y %H:%M";

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d"];
const DATE_TIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a user supplied point in time, interpreted in the local timezone.
///
/// Accepts a date alone (midnight), a date with minutes, or a date with
/// seconds, in either `DD.MM.YYYY` or `YYYY-MM-DD` order.
pub fn parse_time(input: &str) -> Result<DateTime<Local>> {
    let input = input.trim();

    let naive = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| BackupError::TimeFormat(input.to_string()))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| BackupError::TimeFormat(input.to_string()))
}

/// Drop sub-second precision; archives and the index only keep whole seconds.
pub fn whole_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Convert a filesystem timestamp, truncated to whole seconds.
pub fn from_system_time(t: SystemTime) -> DateTime<Utc> {
    whole_seconds(DateTime::<Utc>::from(t))
}

/// Build a timestamp from seconds since the Unix epoch.
pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_date_only() {
        let t = parse_time("02.01.2006").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2006, 1, 2));
        assert_eq!((t.hour(), t.minute(), t.second()), (0, 0, 0));
    }

    #[test]
    fn test_parse_minutes_and_seconds() {
        let t = parse_time("02.01.2006 15:04").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (15, 4, 0));

        let t = parse_time("02.01.2006 15:04:05").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (15, 4, 5));
    }

    #[test]
    fn test_parse_iso_order() {
        let a = parse_time("2006-01-02 15:04:05").unwrap();
        let b = parse_time("02.01.2006 15:04:05").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_time("yesterday"),
            Err(BackupError::TimeFormat(_))
        ));
        assert!(parse_time("32.01.2006").is_err());
    }

    #[test]
    fn test_whole_seconds() {
        let t = DateTime::from_timestamp(1_700_000_000, 999_999_999).unwrap();
        assert_eq!(whole_seconds(t).timestamp(), 1_700_000_000);
        assert_eq!(whole_seconds(t).nanosecond(), 0);
    }
}
