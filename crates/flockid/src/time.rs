use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

/// Fallback epoch origin: Monday, August 12, 2024 00:12:00 UTC
/// (08:12:00 at UTC+8).
pub const DEFAULT_EPOCH_MILLIS: u64 = 1_723_421_520_000;

/// Textual form of [`DEFAULT_EPOCH_MILLIS`].
pub const DEFAULT_EPOCH: &str = "2024-08-12T08:12:00+08:00";

/// Naive layout accepted for epoch origins without an explicit offset. Such
/// values are interpreted in the host's local time zone.
const NAIVE_EPOCH_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A trait for time sources that return wall-clock milliseconds.
///
/// Generators rely on this clock being able to move *backward* (NTP steps,
/// manual adjustments) so that the drift policy can react to it; a monotonic
/// source would hide exactly the condition the policy exists for.
///
/// # Example
///
/// ```
/// use flockid::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns milliseconds since 1970-01-01 UTC.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// The host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        // A clock set before 1970 reads as zero.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

/// Parses an epoch origin into milliseconds since the Unix epoch.
///
/// Accepts RFC 3339 (`2024-08-12T08:12:00+08:00`) or the naive
/// `YYYY-MM-DD HH:MM:SS` form in local time. Returns `None` when the input
/// matches neither or lies before 1970.
///
/// ```
/// use flockid::{parse_epoch, DEFAULT_EPOCH, DEFAULT_EPOCH_MILLIS};
///
/// assert_eq!(parse_epoch(DEFAULT_EPOCH), Some(DEFAULT_EPOCH_MILLIS));
/// assert_eq!(parse_epoch("yesterday"), None);
/// ```
pub fn parse_epoch(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let millis = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.timestamp_millis()
    } else {
        let naive = NaiveDateTime::parse_from_str(raw, NAIVE_EPOCH_FORMAT).ok()?;
        Local.from_local_datetime(&naive).earliest()?.timestamp_millis()
    };
    u64::try_from(millis).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(
            parse_epoch("2024-08-12T00:12:00Z"),
            Some(DEFAULT_EPOCH_MILLIS)
        );
        assert_eq!(
            parse_epoch("  2024-08-12T08:12:00+08:00 "),
            Some(DEFAULT_EPOCH_MILLIS)
        );
    }

    #[test]
    fn parses_naive_local_time() {
        let expected = Local
            .with_ymd_and_hms(2024, 8, 12, 8, 12, 0)
            .earliest()
            .unwrap()
            .timestamp_millis() as u64;
        assert_eq!(parse_epoch("2024-08-12 08:12:00"), Some(expected));
    }

    #[test]
    fn rejects_garbage_and_pre_unix() {
        assert_eq!(parse_epoch(""), None);
        assert_eq!(parse_epoch("2024/08/12"), None);
        assert_eq!(parse_epoch("1969-12-31T23:59:59Z"), None);
    }

    #[test]
    fn system_clock_is_after_default_epoch() {
        assert!(SystemClock.current_millis() > DEFAULT_EPOCH_MILLIS);
    }
}
