use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::confirm::{ConfirmationPolicy, TransferEstimate};
use super::pool::{Pool, UnitResult};
use super::range::{chunked_units, hourly_units, TimeRange, UnitTarget, WorkUnit};
use super::summary::{ConfirmationOutcome, RetrievalSummary, UnitFailure};
use super::{ScheduleError, UnitError};
use crate::backend::log_query::QueryRunner;
use crate::backend::object_store::{resolve_base_prefix, ListedObject, ObjectFetcher};
use crate::backend::{LogQueryService, ObjectStore};
use crate::config::{ExtractionConfig, OnExisting, RetrievalConfig};
use crate::discovery::{DestinationDescriptor, DestinationKind, Locator, ResourceScope};
use crate::extract::{ExtractionOptions, WrapperMode};
use crate::sink::{KeySpace, Sink};

/// Knobs for one retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub concurrency: usize,
    pub unit_timeout: Option<Duration>,
    /// Overall run deadline, counted from the start of `retrieve`.
    pub deadline: Option<Duration>,
    pub query_chunk: Duration,
    pub poll_interval: Duration,
    pub query: String,
    pub on_existing: OnExisting,
    pub extraction: ExtractionOptions,
}

impl RetrievalSettings {
    pub fn from_config(retrieval: &RetrievalConfig, extraction: &ExtractionConfig) -> Self {
        Self {
            concurrency: retrieval.concurrency,
            unit_timeout: retrieval.unit_timeout,
            deadline: retrieval.deadline,
            query_chunk: retrieval.query_chunk,
            poll_interval: retrieval.poll_interval,
            query: retrieval.query.clone(),
            on_existing: retrieval.on_existing,
            extraction: ExtractionOptions::from_config(extraction),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default(), &ExtractionConfig::default())
    }
}

/// Backend clients a run may use. Only the one matching the destination is
/// needed.
#[derive(Clone, Default)]
pub struct Providers {
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub log_query: Option<Arc<dyn LogQueryService>>,
}

/// Runs retrievals for destination descriptors.
pub struct Retriever {
    providers: Providers,
    sink: Arc<dyn Sink>,
    policy: Box<dyn ConfirmationPolicy>,
    settings: RetrievalSettings,
    account_id: String,
    progress: Arc<AtomicU64>,
}

impl Retriever {
    /// `account_id` is the caller's account; it names the top level of every
    /// sink key.
    pub fn new(
        providers: Providers,
        sink: Arc<dyn Sink>,
        policy: Box<dyn ConfirmationPolicy>,
        settings: RetrievalSettings,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            sink,
            policy,
            settings,
            account_id: account_id.into(),
            progress: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bytes downloaded so far by object-store units, for progress display.
    pub fn progress(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.progress)
    }

    /// Retrieve everything `descriptor` holds for `range`.
    ///
    /// Unit failures end up in the summary; only setup problems return an
    /// error. The run deadline starts now and also covers the confirmation
    /// prompt.
    pub async fn retrieve(
        &self,
        descriptor: &DestinationDescriptor,
        range: TimeRange,
    ) -> Result<RetrievalSummary, ScheduleError> {
        let (range, clamped) = range.clamp_to(Utc::now());
        if clamped {
            info!(range = %range, "End of range is in the future, clamped to now");
        }

        let mut summary = RetrievalSummary::new(&descriptor.resource.name, descriptor.kind(), range);
        summary.range_clamped = clamped;

        let account = if self.account_id.is_empty() {
            descriptor.account_id().unwrap_or("unknown").to_string()
        } else {
            self.account_id.clone()
        };
        let keys = KeySpace::new(&account, &descriptor.resource.name);
        let pool = Pool::new(
            self.settings.concurrency,
            self.settings.unit_timeout,
            self.settings.deadline,
        );

        info!(
            run_id = %summary.run_id,
            resource = %descriptor.resource.name,
            destination = %descriptor.kind(),
            range = %range,
            concurrency = self.settings.concurrency,
            "Retrieval started"
        );

        match &descriptor.locator {
            Locator::ObjectStore { bucket, prefix } => {
                self.retrieve_objects(&pool, descriptor, bucket, prefix, &account, keys, &mut summary)
                    .await?
            }
            Locator::LogQueryService { log_group } => {
                self.retrieve_queries(&pool, log_group, keys, &mut summary)
                    .await?
            }
        }

        summary.deadline_expired = pool.deadline_expired();
        let summary = summary.finish();

        info!(
            run_id = %summary.run_id,
            planned = summary.units_planned,
            attempted = summary.units_attempted,
            succeeded = summary.units_succeeded,
            failed = summary.units_failed,
            not_started = summary.units_not_started,
            skipped_existing = summary.units_skipped_existing,
            candidates = summary.extraction.candidates,
            emitted = summary.extraction.emitted,
            invalid = summary.extraction.invalid,
            skipped = summary.extraction.skipped,
            deadline_expired = summary.deadline_expired,
            "Retrieval finished"
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn retrieve_objects(
        &self,
        pool: &Pool,
        descriptor: &DestinationDescriptor,
        bucket: &str,
        arn_prefix: &str,
        account: &str,
        keys: KeySpace,
        summary: &mut RetrievalSummary,
    ) -> Result<(), ScheduleError> {
        let store = self
            .providers
            .object_store
            .clone()
            .ok_or(ScheduleError::MissingProvider(DestinationKind::ObjectStore))?;

        let name = descriptor.resource.name.as_str();
        let region_dir = match descriptor.scope() {
            ResourceScope::Regional => descriptor.region.as_str(),
            ResourceScope::CloudFront => "cloudfront",
        };
        let base = resolve_base_prefix(store.as_ref(), bucket, arn_prefix, name, || {
            format!("AWSLogs/{}/WAFLogs/{}/{}/", account, region_dir, name)
        })
        .await;

        let units = hourly_units(&summary.range, &base);
        summary.units_planned = units.len() as u64;
        debug!(base = %base, units = units.len(), "Planned hourly units");

        let fetcher = ObjectFetcher {
            run_id: summary.run_id,
            store,
            sink: Arc::clone(&self.sink),
            bucket: bucket.to_string(),
            keys,
            extraction: self.settings.extraction.clone().with_mode(WrapperMode::Auto),
            on_existing: self.settings.on_existing,
            progress: Arc::clone(&self.progress),
        };

        // Listing phase: every unit, so the whole range can be confirmed.
        // Delivery lags the event time, so an hour directory is filtered
        // against the whole range rather than its own hour.
        let lister = fetcher.clone();
        let range = summary.range;
        let listed = pool
            .run(units, move |ctx| {
                let lister = lister.clone();
                async move {
                    let prefix = ctx
                        .unit
                        .prefix()
                        .ok_or_else(|| UnitError::Worker("unit has no prefix".to_string()))?;
                    let listing = ctx
                        .bound(&format!("list {}", prefix), lister.list_unit(prefix, &range))
                        .await?;
                    Ok(listing)
                }
            })
            .await;

        let mut ready: Vec<(WorkUnit, Vec<ListedObject>)> = Vec::new();
        for (unit, result) in listed {
            match result {
                UnitResult::Done(listing) => {
                    summary.objects_listed += listing.objects.len() as u64;
                    summary.bytes_listed += listing.bytes();
                    summary.objects_untimed += listing.untimed;
                    ready.push((unit, listing.objects));
                }
                UnitResult::Failed(e) => summary.record_failure(unit_failure(&unit, &e)),
                UnitResult::NotStarted => summary.units_not_started += 1,
            }
        }
        ready.sort_by_key(|(unit, _)| unit.index);

        let estimate = TransferEstimate {
            objects: summary.objects_listed,
            bytes: summary.bytes_listed,
        };
        info!(objects = estimate.objects, bytes = estimate.bytes, "Listing complete");

        if estimate.objects > 0 {
            if self.policy.confirm(estimate).await {
                summary.confirmation = ConfirmationOutcome::Approved;
            } else {
                info!(objects = estimate.objects, bytes = estimate.bytes, "Download declined");
                summary.confirmation = ConfirmationOutcome::Declined;
                summary.units_not_started += ready.len() as u64;
                return Ok(());
            }
        }

        // Units with nothing in range are done once listed
        let (empty, work): (Vec<_>, Vec<_>) =
            ready.into_iter().partition(|(_, objects)| objects.is_empty());
        for _ in &empty {
            summary.record_success();
        }
        if work.is_empty() {
            return Ok(());
        }

        let objects: Arc<HashMap<usize, Vec<ListedObject>>> = Arc::new(
            work.iter()
                .map(|(unit, objects)| (unit.index, objects.clone()))
                .collect(),
        );
        let units: Vec<WorkUnit> = work.into_iter().map(|(unit, _)| unit).collect();

        let downloads = pool
            .run(units, move |ctx| {
                let fetcher = fetcher.clone();
                let objects = Arc::clone(&objects);
                async move {
                    let listed = objects
                        .get(&ctx.unit.index)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    Ok(fetcher.fetch_unit(&ctx, listed).await)
                }
            })
            .await;

        for (unit, result) in downloads {
            match result {
                UnitResult::Done(download) => {
                    summary.objects_downloaded += download.objects_downloaded;
                    summary.bytes_downloaded += download.bytes_downloaded;
                    summary.objects_skipped_existing += download.objects_skipped;
                    summary.extraction.merge(&download.tally);
                    match download.failure {
                        Some(e) => summary.record_failure(unit_failure(&unit, &e)),
                        None if download.objects_downloaded == 0 && download.objects_skipped > 0 => {
                            summary.units_skipped_existing += 1
                        }
                        None => summary.record_success(),
                    }
                }
                UnitResult::Failed(e) => summary.record_failure(unit_failure(&unit, &e)),
                UnitResult::NotStarted => summary.units_not_started += 1,
            }
        }
        Ok(())
    }

    async fn retrieve_queries(
        &self,
        pool: &Pool,
        log_group: &str,
        keys: KeySpace,
        summary: &mut RetrievalSummary,
    ) -> Result<(), ScheduleError> {
        let service = self
            .providers
            .log_query
            .clone()
            .ok_or(ScheduleError::MissingProvider(DestinationKind::LogQueryService))?;

        let units = chunked_units(&summary.range, self.settings.query_chunk)?;
        summary.units_planned = units.len() as u64;
        debug!(log_group, units = units.len(), "Planned query units");

        let runner = QueryRunner {
            run_id: summary.run_id,
            service,
            sink: Arc::clone(&self.sink),
            log_group: log_group.to_string(),
            query: self.settings.query.clone(),
            poll_interval: self.settings.poll_interval,
            keys,
            extraction: self.settings.extraction.clone().with_mode(WrapperMode::Envelope),
            on_existing: self.settings.on_existing,
        };

        let results = pool
            .run(units, move |ctx| {
                let runner = runner.clone();
                async move { Ok(runner.run_unit(&ctx).await) }
            })
            .await;

        for (unit, result) in results {
            match result {
                UnitResult::Done(query) => {
                    summary.query_rows += query.rows;
                    if query.truncated {
                        summary.queries_truncated += 1;
                    }
                    summary.extraction.merge(&query.tally);
                    if query.skipped_existing {
                        summary.units_skipped_existing += 1;
                    } else if let Some(e) = query.failure {
                        summary.record_failure(unit_failure(&unit, &e));
                    } else {
                        summary.record_success();
                    }
                }
                UnitResult::Failed(e) => summary.record_failure(unit_failure(&unit, &e)),
                UnitResult::NotStarted => summary.units_not_started += 1,
            }
        }
        Ok(())
    }
}

fn unit_failure(unit: &WorkUnit, error: &UnitError) -> UnitFailure {
    let target = match &unit.target {
        UnitTarget::HourPrefix { prefix, .. } => prefix.clone(),
        UnitTarget::QueryChunk => unit.bounds.to_string(),
    };
    warn!(unit = unit.index, target = %target, error = %error, "Work unit failed");
    UnitFailure {
        unit: unit.index,
        bounds: unit.bounds,
        target,
        kind: error.kind(),
        error: error.to_string(),
    }
}
