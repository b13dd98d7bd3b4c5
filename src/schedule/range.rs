use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use serde::Serialize;
use std::fmt;

use super::ScheduleError;

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ScheduleError> {
        if start > end {
            return Err(ScheduleError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Pull the end (and if needed the start) back to `now`. Returns whether
    /// anything changed.
    pub fn clamp_to(self, now: DateTime<Utc>) -> (Self, bool) {
        if self.end <= now {
            return (self, false);
        }
        let start = self.start.min(now);
        (Self { start, end: now }, true)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration(&self) -> ChronoDuration {
        self.end - self.start
    }

    fn clip(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: start.max(self.start),
            end: end.min(self.end),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitTarget {
    /// One hour bucket of an object store, listed under `prefix`.
    HourPrefix {
        hour: DateTime<Utc>,
        prefix: String,
    },
    /// One query over the unit's bounds.
    QueryChunk,
}

/// One independently schedulable slice of a retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    pub index: usize,
    pub bounds: TimeRange,
    pub target: UnitTarget,
}

impl WorkUnit {
    /// The hour prefix an object-store unit lists.
    pub fn prefix(&self) -> Option<&str> {
        match &self.target {
            UnitTarget::HourPrefix { prefix, .. } => Some(prefix),
            UnitTarget::QueryChunk => None,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            UnitTarget::HourPrefix { prefix, .. } => write!(f, "#{} {}", self.index, prefix),
            UnitTarget::QueryChunk => write!(f, "#{} {}", self.index, self.bounds),
        }
    }
}

/// The object key prefix for one hour bucket: `base/YYYY/MM/DD/HH/`.
pub fn hour_prefix(base: &str, hour: DateTime<Utc>) -> String {
    let mut prefix = String::with_capacity(base.len() + 14);
    prefix.push_str(base);
    if !base.is_empty() && !base.ends_with('/') {
        prefix.push('/');
    }
    prefix.push_str(&hour.format("%Y/%m/%d/%H/").to_string());
    prefix
}

/// One unit per hour bucket intersecting `range`, bounds clipped to it.
pub fn hourly_units(range: &TimeRange, base_prefix: &str) -> Vec<WorkUnit> {
    let mut units = Vec::new();
    if range.is_empty() {
        return units;
    }

    let one_hour = ChronoDuration::hours(1);
    let mut hour = match range.start.duration_trunc(one_hour) {
        Ok(hour) => hour,
        Err(_) => range.start,
    };

    while hour < range.end {
        let next = hour + one_hour;
        units.push(WorkUnit {
            index: units.len(),
            bounds: range.clip(hour, next),
            target: UnitTarget::HourPrefix {
                hour,
                prefix: hour_prefix(base_prefix, hour),
            },
        });
        hour = next;
    }
    units
}

/// Consecutive `chunk`-sized units covering `range`, the last one clipped.
pub fn chunked_units(
    range: &TimeRange,
    chunk: std::time::Duration,
) -> Result<Vec<WorkUnit>, ScheduleError> {
    let step = ChronoDuration::from_std(chunk)
        .ok()
        .filter(|d| *d > ChronoDuration::zero())
        .ok_or(ScheduleError::InvalidChunk(chunk))?;

    let mut units = Vec::new();
    let mut cursor = range.start;
    while cursor < range.end {
        let next = cursor
            .checked_add_signed(step)
            .map_or(range.end, |n| n.min(range.end));
        units.push(WorkUnit {
            index: units.len(),
            bounds: TimeRange {
                start: cursor,
                end: next,
            },
            target: UnitTarget::QueryChunk,
        });
        cursor = next;
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn assert_partitions(range: &TimeRange, units: &[WorkUnit]) {
        assert_eq!(units.first().unwrap().bounds.start, range.start);
        assert_eq!(units.last().unwrap().bounds.end, range.end);
        for pair in units.windows(2) {
            assert_eq!(pair[0].bounds.end, pair[1].bounds.start);
        }
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit.index, i);
            assert!(!unit.bounds.is_empty());
        }
    }

    #[test]
    fn test_invalid_range() {
        assert!(TimeRange::new(at(2025, 1, 2, 0, 0), at(2025, 1, 1, 0, 0)).is_err());
        assert!(TimeRange::new(at(2025, 1, 1, 0, 0), at(2025, 1, 1, 0, 0)).is_ok());
    }

    #[test]
    fn test_two_days_is_48_hours() {
        let range = TimeRange::new(at(2025, 3, 1, 0, 0), at(2025, 3, 3, 0, 0)).unwrap();
        let units = hourly_units(&range, "AWSLogs/123/WAFLogs/eu-west-1/api/");
        assert_eq!(units.len(), 48);
        assert_partitions(&range, &units);
        match &units[25].target {
            UnitTarget::HourPrefix { prefix, .. } => {
                assert_eq!(prefix, "AWSLogs/123/WAFLogs/eu-west-1/api/2025/03/02/01/")
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_hourly_units_clip_partial_hours() {
        let range = TimeRange::new(at(2025, 3, 1, 10, 30), at(2025, 3, 1, 12, 15)).unwrap();
        let units = hourly_units(&range, "base");
        assert_eq!(units.len(), 3);
        assert_partitions(&range, &units);
        assert_eq!(units[0].bounds.start, at(2025, 3, 1, 10, 30));
        assert_eq!(units[0].bounds.end, at(2025, 3, 1, 11, 0));
        assert_eq!(units[2].bounds.end, at(2025, 3, 1, 12, 15));
        match &units[0].target {
            UnitTarget::HourPrefix { hour, prefix } => {
                assert_eq!(*hour, at(2025, 3, 1, 10, 0));
                assert_eq!(prefix, "base/2025/03/01/10/");
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_chunked_units_last_clipped() {
        let range = TimeRange::new(at(2025, 3, 1, 0, 0), at(2025, 3, 2, 3, 0)).unwrap();
        let units = chunked_units(&range, std::time::Duration::from_secs(6 * 3600)).unwrap();
        assert_eq!(units.len(), 5);
        assert_partitions(&range, &units);
        assert_eq!(units[4].bounds.duration(), ChronoDuration::hours(3));
    }

    #[test]
    fn test_partition_many_ranges() {
        let base = at(2025, 1, 1, 0, 0);
        for start_min in [0i64, 7, 59, 61, 600] {
            for len_min in [1i64, 59, 60, 61, 1439, 1500, 4000] {
                let start = base + ChronoDuration::minutes(start_min);
                let range = TimeRange::new(start, start + ChronoDuration::minutes(len_min)).unwrap();
                assert_partitions(&range, &hourly_units(&range, ""));
                for chunk_min in [1u64, 45, 360] {
                    let units =
                        chunked_units(&range, std::time::Duration::from_secs(chunk_min * 60))
                            .unwrap();
                    assert_partitions(&range, &units);
                }
            }
        }
    }

    #[test]
    fn test_empty_range_has_no_units() {
        let t = at(2025, 3, 1, 0, 0);
        let range = TimeRange::new(t, t).unwrap();
        assert!(hourly_units(&range, "p").is_empty());
        assert!(chunked_units(&range, std::time::Duration::from_secs(60))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let range = TimeRange::new(at(2025, 3, 1, 0, 0), at(2025, 3, 1, 1, 0)).unwrap();
        assert!(chunked_units(&range, std::time::Duration::ZERO).is_err());
    }

    #[test]
    fn test_clamp_future_end() {
        let now = at(2025, 3, 1, 12, 0);
        let range = TimeRange::new(at(2025, 3, 1, 0, 0), at(2025, 3, 2, 0, 0)).unwrap();
        let (clamped, changed) = range.clamp_to(now);
        assert!(changed);
        assert_eq!(clamped.end, now);

        let (same, changed) = clamped.clamp_to(now);
        assert!(!changed);
        assert_eq!(same, clamped);

        let future = TimeRange::new(at(2025, 3, 5, 0, 0), at(2025, 3, 6, 0, 0)).unwrap();
        let (clamped, _) = future.clamp_to(now);
        assert!(clamped.is_empty());
    }

    #[test]
    fn test_hour_prefix_separator() {
        let hour = at(2025, 12, 31, 23, 0);
        assert_eq!(hour_prefix("", hour), "2025/12/31/23/");
        assert_eq!(hour_prefix("a/b", hour), "a/b/2025/12/31/23/");
        assert_eq!(hour_prefix("a/b/", hour), "a/b/2025/12/31/23/");
    }
}
