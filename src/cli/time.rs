use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;

use super::RunError;
use crate::schedule::TimeRange;

/// Span fetched when neither a start nor `--last` is given.
const DEFAULT_SPAN_HOURS: i64 = 24;

/// Parse a time argument: RFC 3339, `YYYY-MM-DDTHH:MMZ`, or a bare date
/// meaning midnight UTC.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, RunError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%MZ") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    Err(RunError::InvalidTime(format!(
        "'{}' is not a time; use YYYY-MM-DD, YYYY-MM-DDTHH:MMZ or RFC 3339",
        value
    )))
}

/// Work out the range to fetch from the command line. `--last` wins over
/// `--start`; a missing end means now.
pub fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    last: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<TimeRange, RunError> {
    let end = match end {
        Some(value) => parse_time(value)?,
        None => now,
    };
    let start = match (last, start) {
        (Some(span), _) => {
            let span = ChronoDuration::from_std(span)
                .map_err(|_| RunError::InvalidTime(format!("--last {:?} is too large", span)))?;
            end - span
        }
        (None, Some(value)) => parse_time(value)?,
        (None, None) => end - ChronoDuration::hours(DEFAULT_SPAN_HOURS),
    };
    TimeRange::new(start, end).map_err(|e| RunError::InvalidTime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("2025-03-01").unwrap(), at(2025, 3, 1, 0, 0));
        assert_eq!(parse_time("2025-03-01T10:30Z").unwrap(), at(2025, 3, 1, 10, 30));
        assert_eq!(parse_time("2025-03-01T10:30:00+02:00").unwrap(), at(2025, 3, 1, 8, 30));
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_resolve_range_defaults() {
        let now = at(2025, 3, 2, 12, 0);
        let range = resolve_range(None, None, None, now).unwrap();
        assert_eq!(range.start, at(2025, 3, 1, 12, 0));
        assert_eq!(range.end, now);

        let range = resolve_range(Some("2025-03-01"), None, Some(Duration::from_secs(3600)), now).unwrap();
        assert_eq!(range.start, at(2025, 3, 2, 11, 0));
    }

    #[test]
    fn test_resolve_range_rejects_reversed() {
        let now = at(2025, 3, 2, 12, 0);
        assert!(matches!(
            resolve_range(Some("2025-03-03"), Some("2025-03-01"), None, now),
            Err(RunError::InvalidTime(_))
        ));
    }
}
