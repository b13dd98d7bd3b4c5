//! Retrieval scheduling: partitions a time range into work units and runs
//! them on a bounded worker pool against one destination.
//!
//! Each worker fetches its unit, extracts records and hands them to the
//! sink. Results come back to the coordinator, which alone builds the
//! [`RetrievalSummary`].

mod confirm;
mod pool;
mod range;
mod run;
mod summary;

pub use confirm::{
    policy_from_config, AutoApprove, ConfirmationPolicy, FnPolicy, Threshold, TransferEstimate,
};
pub use pool::{Pool, UnitContext, UnitResult};
pub use range::{chunked_units, hour_prefix, hourly_units, TimeRange, UnitTarget, WorkUnit};
pub use run::{Providers, RetrievalSettings, Retriever};
pub use summary::{ConfirmationOutcome, RetrievalSummary, UnitFailure};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::discovery::DestinationKind;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("query chunk must be a positive duration, got {0:?}")]
    InvalidChunk(Duration),

    #[error("no {0} provider available for this run")]
    MissingProvider(DestinationKind),
}

/// Why one work unit failed. Never aborts sibling units.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("sink: {0}")]
    Sink(SinkError),

    #[error("payload: {0}")]
    Payload(#[from] std::io::Error),

    #[error("worker: {0}")]
    Worker(String),
}

impl From<SinkError> for UnitError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Source(provider) => UnitError::Provider(provider),
            other => UnitError::Sink(other),
        }
    }
}

impl UnitError {
    /// Provider error class, if the failure came from a provider call.
    pub fn kind(&self) -> Option<ProviderErrorKind> {
        match self {
            UnitError::Provider(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Where a unit's stored output came from. Written into each unit manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub run_id: Uuid,
    pub unit: usize,
    pub bounds: TimeRange,
    pub backend: DestinationKind,
    pub ingested_at: DateTime<Utc>,
}

impl Provenance {
    pub fn new(run_id: Uuid, unit: &WorkUnit, backend: DestinationKind) -> Self {
        Self {
            run_id,
            unit: unit.index,
            bounds: unit.bounds,
            backend,
            ingested_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_failure_becomes_provider_error() {
        let provider = ProviderError::new("get", ProviderErrorKind::Unreachable, "reset");
        let err = UnitError::from(SinkError::Source(provider.clone()));
        assert_eq!(err.kind(), Some(ProviderErrorKind::Unreachable));
        assert_eq!(err.to_string(), provider.to_string());

        let err = UnitError::from(SinkError::InvalidLevel(12));
        assert_eq!(err.kind(), None);
        assert!(err.to_string().starts_with("sink: "));
    }
}
