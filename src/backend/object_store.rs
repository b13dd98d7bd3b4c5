use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use super::keys::{common_prefix, derive_base_prefix, is_log_object, object_timestamp};
use super::ObjectStore;
use crate::config::OnExisting;
use crate::error::ProviderError;
use crate::extract::{decompress_if_gzip, extract, ExtractionOptions, ExtractionTally};
use crate::discovery::DestinationKind;
use crate::schedule::{Provenance, TimeRange, UnitContext, UnitError};
use crate::sink::{write_records, ByteStream, KeySpace, Sink};
use tokio::time::Instant;
use uuid::Uuid;

/// Keys sampled when probing for the log layout.
const PROBE_LIMIT: usize = 1000;

/// Work out where a resource's hour directories start in its bucket.
///
/// Probes `<prefix>AWSLogs/` for keys naming the resource and keeps the part
/// before the first year directory. Falls back to the common prefix of the
/// matching keys, then to the destination's own prefix, then to the standard
/// delivery layout.
pub async fn resolve_base_prefix(
    store: &dyn ObjectStore,
    bucket: &str,
    arn_prefix: &str,
    resource_name: &str,
    fallback: impl FnOnce() -> String,
) -> String {
    let arn_prefix = with_slash(arn_prefix);
    let probe = format!("{}AWSLogs/", arn_prefix);

    match store.sample(bucket, &probe, PROBE_LIMIT).await {
        Ok(objects) => {
            let matching: Vec<String> = objects
                .into_iter()
                .map(|o| o.key)
                .filter(|k| k.contains(resource_name))
                .collect();
            if let Some(first) = matching.first() {
                let base = derive_base_prefix(first).unwrap_or_else(|| common_prefix(&matching));
                if !base.is_empty() {
                    debug!(bucket, base = %base, "Derived base prefix from existing objects");
                    return with_slash(&base);
                }
            }
            debug!(bucket, probe = %probe, "No objects name the resource");
        }
        Err(e) => warn!(bucket, error = %e, "Probing for base prefix failed"),
    }

    if arn_prefix.is_empty() {
        fallback()
    } else {
        arn_prefix
    }
}

fn with_slash(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UnitListing {
    pub objects: Vec<ListedObject>,
    /// Log objects skipped because no timestamp could be read from the key.
    pub untimed: u64,
}

impl UnitListing {
    pub fn bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }
}

/// Result of downloading one unit's objects. `failure` holds the first
/// error; objects handled before it still count.
#[derive(Debug, Default)]
pub struct UnitDownload {
    pub objects_downloaded: u64,
    pub bytes_downloaded: u64,
    pub objects_skipped: u64,
    pub tally: ExtractionTally,
    pub files: Vec<String>,
    pub failure: Option<UnitError>,
}

/// Written beside the files of every downloaded unit.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectManifest {
    pub provenance: Provenance,
    pub objects: Vec<ListedObject>,
    pub objects_skipped: u64,
    pub files: Vec<String>,
    pub tally: ExtractionTally,
    /// The first error the unit hit. Absent when every object was handled.
    pub failure: Option<String>,
}

/// Shared state for every object-store unit of one run.
#[derive(Clone)]
pub struct ObjectFetcher {
    pub run_id: Uuid,
    pub store: Arc<dyn ObjectStore>,
    pub sink: Arc<dyn Sink>,
    pub bucket: String,
    pub keys: KeySpace,
    pub extraction: ExtractionOptions,
    pub on_existing: OnExisting,
    /// Bytes downloaded so far, across all workers.
    pub progress: Arc<AtomicU64>,
}

impl ObjectFetcher {
    /// List one hour prefix, keeping log objects whose embedded timestamp
    /// falls inside `range`. Listing order is not relied on.
    pub async fn list_unit(&self, prefix: &str, range: &TimeRange) -> Result<UnitListing, ProviderError> {
        let mut listing = UnitListing::default();

        for object in self.store.list(&self.bucket, prefix).await? {
            if !is_log_object(&object.key) {
                continue;
            }
            let Some(timestamp) = object_timestamp(&object.key) else {
                debug!(key = %object.key, "No timestamp in object key, skipping");
                listing.untimed += 1;
                continue;
            };
            if range.contains(timestamp) {
                listing.objects.push(ListedObject {
                    key: object.key,
                    size: object.size,
                    timestamp,
                });
            }
        }

        listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listing)
    }

    /// Download, store and extract every object of one unit. A failed
    /// object does not stop the rest; the unit's deadline does, leaving what
    /// was stored before it in place.
    pub async fn fetch_unit(&self, ctx: &UnitContext, objects: &[ListedObject]) -> UnitDownload {
        let mut download = UnitDownload::default();

        for object in objects {
            if ctx.expired() {
                let e = ctx.deadline_error(&format!("download unit {}", ctx.unit.index));
                warn!(unit = ctx.unit.index, stored = download.objects_downloaded, "Unit deadline passed, leaving remaining objects");
                download.failure.get_or_insert(e.into());
                break;
            }
            if let Err(e) = self.fetch_object(ctx, object, &mut download).await {
                warn!(key = %object.key, error = %e, "Object retrieval failed");
                download.failure.get_or_insert(e);
            }
        }

        if !objects.is_empty() {
            let manifest = ObjectManifest {
                provenance: Provenance::new(self.run_id, &ctx.unit, DestinationKind::ObjectStore),
                objects: objects.to_vec(),
                objects_skipped: download.objects_skipped,
                files: download.files.clone(),
                tally: download.tally,
                failure: download.failure.as_ref().map(ToString::to_string),
            };
            let key = self.keys.object_manifest(&ctx.unit.bounds);
            let written = match serde_json::to_vec_pretty(&manifest) {
                Ok(bytes) => self.sink.write(&key, &bytes).await.map_err(UnitError::from),
                Err(e) => Err(UnitError::Payload(e.into())),
            };
            match written {
                Ok(stored) => download.files.push(stored),
                Err(e) => {
                    download.failure.get_or_insert(e);
                }
            }
        }
        download
    }

    async fn fetch_object(
        &self,
        ctx: &UnitContext,
        object: &ListedObject,
        download: &mut UnitDownload,
    ) -> Result<(), UnitError> {
        let raw_key = self.keys.raw_object(object.timestamp, &object.key);

        if self.on_existing == OnExisting::Skip && self.sink.exists(&raw_key).await? {
            debug!(key = %object.key, "Already stored, skipping");
            download.objects_skipped += 1;
            return Ok(());
        }

        let operation = format!("get s3://{}/{}", self.bucket, object.key);
        let progress = Arc::clone(&self.progress);
        let body = ctx
            .bound(&operation, self.store.get(&self.bucket, &object.key))
            .await?
            .inspect_ok(move |chunk| {
                progress.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            })
            .boxed();
        let body = match ctx.deadline {
            Some(deadline) => until_deadline(body, deadline, ctx.deadline_error(&operation)),
            None => body,
        };

        let written = self.sink.write_stream(&raw_key, body).await?;
        download.objects_downloaded += 1;
        download.bytes_downloaded += written;
        download.files.push(raw_key.clone());

        let stored = self.sink.read(&raw_key).await?;
        let payload = decompress_if_gzip(&stored)?;
        let output = extract(&payload, &self.extraction);
        for issue in &output.issues {
            debug!(key = %object.key, candidate = issue.candidate, kind = ?issue.kind, detail = %issue.detail, "Candidate dropped");
        }
        download.tally.merge(&output.tally);

        let records_key = self.keys.object_records(object.timestamp, &object.key);
        if let Some(stored) = write_records(self.sink.as_ref(), &records_key, &output.records).await? {
            download.files.push(stored);
        }

        debug!(
            key = %object.key,
            bytes = written,
            records = output.records.len(),
            "Object retrieved"
        );
        Ok(())
    }
}

/// End `body` with `expired` if it is still producing at `deadline`, so a
/// stalled download fails like any other broken stream.
fn until_deadline(body: ByteStream, deadline: Instant, expired: ProviderError) -> ByteStream {
    futures::stream::unfold((body, Some(expired)), move |(mut body, expired)| async move {
        let expired = expired?;
        match tokio::time::timeout_at(deadline, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, (body, Some(expired)))),
            Ok(None) => None,
            Err(_) => Some((Err(expired), (body, None))),
        }
    })
    .boxed()
}
