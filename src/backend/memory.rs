//! In-process providers for tests and offline runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;

use super::{LogQueryService, ObjectInfo, ObjectStore, QueryPoll, QueryStatus, ResultRow};
use crate::discovery::{LoggingConfigApi, ProtectedResource, ResourceScope};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::schedule::TimeRange;
use crate::sink::ByteStream;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bucket contents held in memory. Bodies are streamed back in small chunks.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Bytes>>,
    failing: Vec<(String, ProviderError)>,
    stalling: Vec<String>,
    chunk_size: usize,
    get_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            chunk_size: 4,
            ..Self::default()
        }
    }

    pub fn with_object(self, bucket: &str, key: &str, body: Vec<u8>) -> Self {
        self.put(bucket, key, body);
        self
    }

    /// Make every listing of a prefix starting with `prefix` fail.
    pub fn failing_prefix(mut self, prefix: &str, error: ProviderError) -> Self {
        self.failing.push((prefix.to_string(), error));
        self
    }

    /// Add an object whose body stops after its first chunk and never ends.
    pub fn stalling_object(mut self, bucket: &str, key: &str, body: Vec<u8>) -> Self {
        self.put(bucket, key, body);
        self.stalling.push(key.to_string());
        self
    }

    pub fn put(&self, bucket: &str, key: &str, body: Vec<u8>) {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), Bytes::from(body));
    }

    /// Number of `get` calls made so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, ProviderError> {
        if let Some((_, error)) = self.failing.iter().find(|(p, _)| prefix.starts_with(p.as_str())) {
            return Err(error.clone());
        }
        Ok(lock(&self.objects)
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), body)| ObjectInfo {
                key: k.clone(),
                size: body.len() as u64,
            })
            .collect())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, ProviderError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let body = lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(
                    format!("get s3://{}/{}", bucket, key),
                    ProviderErrorKind::NotFound,
                    "no such key",
                )
            })?;

        let chunk_size = self.chunk_size.max(1);
        let chunks: Vec<Result<Bytes, ProviderError>> = (0..body.len())
            .step_by(chunk_size)
            .map(|at| Ok(body.slice(at..(at + chunk_size).min(body.len()))))
            .collect();
        if self.stalling.iter().any(|k| k == key) {
            let first = chunks.into_iter().take(1);
            return Ok(futures::stream::iter(first).chain(futures::stream::pending()).boxed());
        }
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// How queries submitted to a [`MemoryLogQuery`] behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryBehavior {
    /// Rows appear over this many polls, the last one reporting completion.
    CompleteAfter(usize),
    /// Stays running forever, never returning rows.
    NeverComplete,
    /// Ends with this status on the first poll.
    EndWith(QueryStatus),
    /// Answers this many polls with every row, still running, then never
    /// answers again.
    StallAfter(usize),
}

struct RunningQuery {
    rows: Vec<ResultRow>,
    polls: usize,
}

/// Log group contents held in memory, answering queries by time bounds.
pub struct MemoryLogQuery {
    events: Vec<(DateTime<Utc>, String)>,
    behavior: QueryBehavior,
    queries: Mutex<HashMap<String, RunningQuery>>,
    stopped: Mutex<Vec<String>>,
    started: AtomicUsize,
    row_limit: Option<usize>,
}

impl MemoryLogQuery {
    pub fn new(behavior: QueryBehavior) -> Self {
        Self {
            events: Vec::new(),
            behavior,
            queries: Mutex::new(HashMap::new()),
            stopped: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            row_limit: None,
        }
    }

    /// Cap every query at `limit` rows, as a hosted service does.
    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn with_event(mut self, at: DateTime<Utc>, message: &str) -> Self {
        self.events.push((at, message.to_string()));
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Ids of queries that were asked to stop.
    pub fn stopped(&self) -> Vec<String> {
        lock(&self.stopped).clone()
    }
}

#[async_trait]
impl LogQueryService for MemoryLogQuery {
    async fn start_query(
        &self,
        _log_group: &str,
        bounds: &TimeRange,
        _query: &str,
    ) -> Result<String, ProviderError> {
        let n = self.started.fetch_add(1, Ordering::SeqCst);
        let id = format!("query-{:04}", n);

        let mut matching: Vec<&(DateTime<Utc>, String)> =
            self.events.iter().filter(|(at, _)| bounds.contains(*at)).collect();
        matching.sort_by_key(|(at, _)| *at);
        let limit = self.row_limit.unwrap_or(usize::MAX);
        let rows = matching
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (at, message))| {
                vec![
                    (
                        "@timestamp".to_string(),
                        at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                    ),
                    ("@message".to_string(), message.clone()),
                    ("@ptr".to_string(), format!("{}-{}", id, i)),
                ]
            })
            .collect();

        lock(&self.queries).insert(id.clone(), RunningQuery { rows, polls: 0 });
        Ok(id)
    }

    fn row_limit(&self) -> Option<usize> {
        self.row_limit
    }

    async fn poll_query(&self, query_id: &str) -> Result<QueryPoll, ProviderError> {
        let (poll, stalled) = self.answer(query_id)?;
        if stalled {
            futures::future::pending::<()>().await;
        }
        Ok(poll)
    }

    async fn stop_query(&self, query_id: &str) -> Result<(), ProviderError> {
        lock(&self.stopped).push(query_id.to_string());
        Ok(())
    }
}

impl MemoryLogQuery {
    /// The next poll's answer, and whether the poll should hang instead.
    fn answer(&self, query_id: &str) -> Result<(QueryPoll, bool), ProviderError> {
        let mut queries = lock(&self.queries);
        let query = queries.get_mut(query_id).ok_or_else(|| {
            ProviderError::new(
                format!("query {}", query_id),
                ProviderErrorKind::NotFound,
                "unknown query id",
            )
        })?;
        query.polls += 1;

        let poll = match self.behavior {
            QueryBehavior::StallAfter(answered) => {
                let poll = QueryPoll {
                    status: QueryStatus::Running,
                    rows: query.rows.clone(),
                };
                return Ok((poll, query.polls > answered));
            }
            QueryBehavior::NeverComplete => QueryPoll {
                status: QueryStatus::Running,
                rows: Vec::new(),
            },
            QueryBehavior::EndWith(status) => QueryPoll {
                status,
                rows: Vec::new(),
            },
            QueryBehavior::CompleteAfter(total) => {
                let total = total.max(1);
                if query.polls >= total {
                    QueryPoll {
                        status: QueryStatus::Complete,
                        rows: query.rows.clone(),
                    }
                } else {
                    let shown = query.rows.len() * query.polls / total;
                    QueryPoll {
                        status: QueryStatus::Running,
                        rows: query.rows[..shown].to_vec(),
                    }
                }
            }
        };
        Ok((poll, false))
    }
}

/// Web ACLs and their logging configuration held in memory.
pub struct MemoryLoggingConfig {
    region: String,
    resources: Vec<(ProtectedResource, Option<Vec<String>>)>,
    failing: HashMap<ResourceScope, ProviderError>,
}

impl MemoryLoggingConfig {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            resources: Vec::new(),
            failing: HashMap::new(),
        }
    }

    pub fn with_resource(mut self, resource: ProtectedResource, destinations: Option<Vec<String>>) -> Self {
        self.resources.push((resource, destinations));
        self
    }

    pub fn failing_listing(mut self, scope: ResourceScope, error: ProviderError) -> Self {
        self.failing.insert(scope, error);
        self
    }
}

#[async_trait]
impl LoggingConfigApi for MemoryLoggingConfig {
    fn default_region(&self) -> &str {
        &self.region
    }

    async fn list_resources(&self, scope: ResourceScope) -> Result<Vec<ProtectedResource>, ProviderError> {
        if let Some(error) = self.failing.get(&scope) {
            return Err(error.clone());
        }
        Ok(self
            .resources
            .iter()
            .filter(|(r, _)| r.scope == scope)
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn logging_destinations(
        &self,
        resource: &ProtectedResource,
    ) -> Result<Option<Vec<String>>, ProviderError> {
        Ok(self
            .resources
            .iter()
            .find(|(r, _)| r.arn == resource.arn)
            .and_then(|(_, d)| d.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_object_store_streams_in_chunks() {
        let store = MemoryObjectStore::new().with_object("b", "k/1.log", b"0123456789".to_vec());
        let chunks: Vec<Bytes> = store.get("b", "k/1.log").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"0123456789".to_vec());
        assert_eq!(store.get_calls(), 1);

        let missing = store.get("b", "k/2.log").await.err().unwrap();
        assert_eq!(missing.kind, ProviderErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_log_query_reveals_rows_progressively() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let service = MemoryLogQuery::new(QueryBehavior::CompleteAfter(2))
            .with_event(at, "{\"a\":1}")
            .with_event(at + chrono::Duration::minutes(1), "{\"a\":2}")
            .with_event(at + chrono::Duration::hours(5), "{\"a\":3}");
        let bounds = TimeRange::new(at, at + chrono::Duration::hours(1)).unwrap();

        let id = service.start_query("g", &bounds, "q").await.unwrap();
        let first = service.poll_query(&id).await.unwrap();
        assert_eq!(first.status, QueryStatus::Running);
        assert_eq!(first.rows.len(), 1);
        let second = service.poll_query(&id).await.unwrap();
        assert_eq!(second.status, QueryStatus::Complete);
        assert_eq!(second.rows.len(), 2);
    }
}
