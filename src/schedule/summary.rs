use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::range::TimeRange;
use crate::discovery::DestinationKind;
use crate::error::ProviderErrorKind;
use crate::extract::ExtractionTally;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Nothing needed confirming (log-query run, or nothing listed).
    NotRequired,
    Approved,
    Declined,
}

/// One work unit that did not complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub unit: usize,
    pub bounds: TimeRange,
    pub target: String,
    /// Provider error class, absent for local (sink or payload) failures.
    pub kind: Option<ProviderErrorKind>,
    pub error: String,
}

/// Aggregate result of one retrieval run. Built by the coordinator from
/// per-unit results once every unit has finished.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalSummary {
    pub run_id: Uuid,
    pub resource: String,
    pub destination: DestinationKind,
    pub range: TimeRange,
    pub range_clamped: bool,

    pub units_planned: u64,
    pub units_attempted: u64,
    pub units_succeeded: u64,
    pub units_failed: u64,
    /// Units never started, because of the run deadline or a declined
    /// confirmation.
    pub units_not_started: u64,
    /// Units left alone because their output already existed.
    pub units_skipped_existing: u64,

    pub objects_listed: u64,
    pub bytes_listed: u64,
    pub objects_downloaded: u64,
    pub bytes_downloaded: u64,
    pub objects_skipped_existing: u64,
    /// Object keys that carried no parseable timestamp.
    pub objects_untimed: u64,
    pub query_rows: u64,
    /// Query units that completed at the service's row limit.
    pub queries_truncated: u64,

    pub confirmation: ConfirmationOutcome,
    pub extraction: ExtractionTally,
    pub failures: Vec<UnitFailure>,
    pub deadline_expired: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RetrievalSummary {
    pub fn new(resource: &str, destination: DestinationKind, range: TimeRange) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            resource: resource.to_string(),
            destination,
            range,
            range_clamped: false,
            units_planned: 0,
            units_attempted: 0,
            units_succeeded: 0,
            units_failed: 0,
            units_not_started: 0,
            units_skipped_existing: 0,
            objects_listed: 0,
            bytes_listed: 0,
            objects_downloaded: 0,
            bytes_downloaded: 0,
            objects_skipped_existing: 0,
            objects_untimed: 0,
            query_rows: 0,
            queries_truncated: 0,
            confirmation: ConfirmationOutcome::NotRequired,
            extraction: ExtractionTally::default(),
            failures: Vec::new(),
            deadline_expired: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn record_failure(&mut self, failure: UnitFailure) {
        self.units_attempted += 1;
        self.units_failed += 1;
        self.failures.push(failure);
    }

    pub(crate) fn record_success(&mut self) {
        self.units_attempted += 1;
        self.units_succeeded += 1;
    }

    /// A run whose deadline fired before any unit completed. Partial
    /// failures are not hard failures.
    pub fn is_hard_failure(&self) -> bool {
        self.deadline_expired && self.units_planned > 0 && self.units_succeeded == 0
            && self.units_skipped_existing == 0
    }

    pub(crate) fn finish(mut self) -> Self {
        self.failures.sort_by_key(|f| f.unit);
        self.finished_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary() -> RetrievalSummary {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, start + chrono::Duration::hours(2)).unwrap();
        RetrievalSummary::new("api", DestinationKind::ObjectStore, range)
    }

    #[test]
    fn test_hard_failure_only_when_deadline_and_nothing_done() {
        let mut s = summary();
        s.units_planned = 2;
        s.deadline_expired = true;
        assert!(s.is_hard_failure());

        s.record_success();
        assert!(!s.is_hard_failure());

        let mut partial = summary();
        partial.units_planned = 2;
        partial.record_failure(UnitFailure {
            unit: 0,
            bounds: partial.range,
            target: "x".to_string(),
            kind: Some(ProviderErrorKind::Service),
            error: "boom".to_string(),
        });
        assert!(!partial.is_hard_failure());
    }

    #[test]
    fn test_summary_serializes() {
        let s = summary().finish();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["destination"], "object-store");
        assert_eq!(json["confirmation"], "not_required");
        assert_eq!(json["extraction"]["candidates"], 0);
    }
}
