use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{LogQueryService, QueryStatus, ResultRow};
use crate::config::OnExisting;
use crate::discovery::DestinationKind;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::extract::{decompress_if_gzip, extract, ExtractionOptions, ExtractionTally};
use crate::schedule::{Provenance, UnitContext, UnitError};
use crate::sink::{write_records, KeySpace, Sink};
use uuid::Uuid;

/// How long a stop request may take once a unit has given up.
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Written beside a unit's parts once its query has been submitted,
/// whether or not it finished.
#[derive(Debug, Clone, Serialize)]
pub struct QueryManifest {
    pub provenance: Provenance,
    pub query_id: String,
    pub log_group: String,
    pub rows: u64,
    pub parts: usize,
    pub files: Vec<String>,
    pub tally: ExtractionTally,
    /// The query completed at the service's row limit.
    pub truncated: bool,
    /// Why the unit stopped early. Absent for a completed query.
    pub failure: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// The part of a stored manifest that decides whether a unit is done.
#[derive(Debug, Deserialize)]
struct ManifestStatus {
    #[serde(default)]
    failure: Option<String>,
}

/// Result of one log-query unit. `failure` holds the error that ended it;
/// parts written before it still count.
#[derive(Debug, Default)]
pub struct UnitQuery {
    pub rows: u64,
    pub parts: usize,
    pub tally: ExtractionTally,
    pub files: Vec<String>,
    pub skipped_existing: bool,
    pub truncated: bool,
    pub failure: Option<UnitError>,
}

/// Shared state for every log-query unit of one run.
#[derive(Clone)]
pub struct QueryRunner {
    pub run_id: Uuid,
    pub service: Arc<dyn LogQueryService>,
    pub sink: Arc<dyn Sink>,
    pub log_group: String,
    pub query: String,
    pub poll_interval: Duration,
    pub keys: KeySpace,
    pub extraction: ExtractionOptions,
    pub on_existing: OnExisting,
}

impl QueryRunner {
    /// Submit one query for the unit's bounds and poll it to completion,
    /// writing each batch of new rows as its own part.
    ///
    /// Gives up at the unit's deadline, asking the service to stop the query.
    /// Every call to the service is held to that deadline.
    pub async fn run_unit(&self, ctx: &UnitContext) -> UnitQuery {
        let bounds = ctx.unit.bounds;
        let mut result = UnitQuery::default();

        let manifest_key = self.keys.query_manifest(&bounds);
        if self.on_existing == OnExisting::Skip {
            match self.completed_before(&manifest_key).await {
                Ok(true) => {
                    debug!(unit = ctx.unit.index, "Completed manifest present, skipping");
                    result.skipped_existing = true;
                    return result;
                }
                Ok(false) => {}
                Err(e) => {
                    result.failure = Some(e);
                    return result;
                }
            }
        }

        let started = ctx
            .bound(
                &format!("start query for unit {}", ctx.unit.index),
                self.service.start_query(&self.log_group, &bounds, &self.query),
            )
            .await;
        let query_id = match started {
            Ok(id) => id,
            Err(e) => {
                result.failure = Some(e.into());
                return result;
            }
        };
        info!(unit = ctx.unit.index, query_id = %query_id, bounds = %bounds, "Query started");

        if let Err(e) = self.poll_until_complete(ctx, &query_id, &mut result).await {
            if matches!(&e, UnitError::Provider(p) if matches!(p.kind, ProviderErrorKind::Timeout | ProviderErrorKind::Cancelled))
            {
                self.stop(&query_id).await;
            }
            result.failure = Some(e);
        }

        let manifest = QueryManifest {
            provenance: Provenance::new(self.run_id, &ctx.unit, DestinationKind::LogQueryService),
            query_id,
            log_group: self.log_group.clone(),
            rows: result.rows,
            parts: result.parts,
            files: result.files.clone(),
            tally: result.tally,
            truncated: result.truncated,
            failure: result.failure.as_ref().map(ToString::to_string),
            finished_at: Utc::now(),
        };
        let written = match serde_json::to_vec_pretty(&manifest) {
            Ok(bytes) => self.sink.write(&manifest_key, &bytes).await.map_err(UnitError::from),
            Err(e) => Err(UnitError::Payload(e.into())),
        };
        match written {
            Ok(stored) => result.files.push(stored),
            Err(e) => {
                result.failure.get_or_insert(e);
            }
        }
        result
    }

    /// Whether a manifest at `key` records a unit that finished. A missing
    /// or unreadable manifest, or one recording a failure, does not count.
    async fn completed_before(&self, key: &str) -> Result<bool, UnitError> {
        let stored = self.sink.stored_key(key);
        if !self.sink.exists(&stored).await? {
            return Ok(false);
        }
        let raw = self.sink.read(&stored).await?;
        let payload = decompress_if_gzip(&raw)?;
        Ok(serde_json::from_slice::<ManifestStatus>(&payload).is_ok_and(|status| status.failure.is_none()))
    }

    async fn poll_until_complete(
        &self,
        ctx: &UnitContext,
        query_id: &str,
        result: &mut UnitQuery,
    ) -> Result<(), UnitError> {
        let operation = format!("query {}", query_id);
        let mut seen = 0usize;

        loop {
            match ctx.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = tokio::time::sleep_until(deadline) => {
                            warn!(unit = ctx.unit.index, query_id, rows = result.rows, "Query did not finish in time");
                            return Err(ctx.deadline_error(&operation).into());
                        }
                    }
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }

            let poll = match ctx.bound(&operation, self.service.poll_query(query_id)).await {
                Ok(poll) => poll,
                Err(e) => {
                    if ctx.expired() {
                        warn!(unit = ctx.unit.index, query_id, rows = result.rows, "Query results did not arrive in time");
                    }
                    return Err(e.into());
                }
            };

            if poll.rows.len() > seen {
                self.write_part(ctx, &poll.rows[seen..], result).await?;
                seen = poll.rows.len();
            }

            match poll.status {
                QueryStatus::Complete => {
                    if let Some(limit) = self.service.row_limit() {
                        if seen >= limit {
                            warn!(
                                unit = ctx.unit.index,
                                query_id,
                                rows = seen,
                                limit,
                                "Query hit the row limit, results may be incomplete; use a smaller query chunk"
                            );
                            result.truncated = true;
                        }
                    }
                    debug!(unit = ctx.unit.index, query_id, rows = result.rows, "Query complete");
                    return Ok(());
                }
                status if status.is_pending() => continue,
                status => {
                    return Err(ProviderError::new(
                        operation,
                        ProviderErrorKind::Service,
                        format!("query ended with status {:?}", status),
                    )
                    .into());
                }
            }
        }
    }

    async fn write_part(
        &self,
        ctx: &UnitContext,
        rows: &[ResultRow],
        result: &mut UnitQuery,
    ) -> Result<(), UnitError> {
        let part = result.parts;
        let payload = render_rows(rows)?;

        let stored = self
            .sink
            .write(&self.keys.query_part(&ctx.unit.bounds, part), &payload)
            .await?;
        result.files.push(stored);

        let output = extract(&payload, &self.extraction);
        for issue in &output.issues {
            debug!(unit = ctx.unit.index, part, candidate = issue.candidate, kind = ?issue.kind, detail = %issue.detail, "Candidate dropped");
        }
        result.tally.merge(&output.tally);

        let records_key = self.keys.query_records(&ctx.unit.bounds, part);
        if let Some(stored) = write_records(self.sink.as_ref(), &records_key, &output.records).await? {
            result.files.push(stored);
        }

        result.rows += rows.len() as u64;
        result.parts += 1;
        debug!(unit = ctx.unit.index, part, rows = rows.len(), records = output.records.len(), "Part written");
        Ok(())
    }

    async fn stop(&self, query_id: &str) {
        match tokio::time::timeout(STOP_TIMEOUT, self.service.stop_query(query_id)).await {
            Ok(Ok(())) => debug!(query_id, "Query stopped"),
            Ok(Err(e)) => warn!(query_id, error = %e, "Stopping query failed"),
            Err(_) => warn!(query_id, "Stopping query timed out"),
        }
    }
}

/// Render result rows as pretty-printed wrapper objects, one after another.
/// Rows with no fields are left out.
pub fn render_rows(rows: &[ResultRow]) -> Result<Vec<u8>, UnitError> {
    let mut out = Vec::new();
    for row in rows {
        let entry: Map<String, Value> = row
            .iter()
            .map(|(field, value)| (field.clone(), Value::String(value.clone())))
            .collect();
        if entry.is_empty() {
            continue;
        }
        serde_json::to_writer_pretty(&mut out, &entry).map_err(|e| UnitError::Payload(e.into()))?;
        out.push(b'\n');
    }
    Ok(out)
}
