//! Provider seams and the two fetch strategies built on them.
//!
//! The object store is list-then-fetch; the log query service is
//! submit-then-poll. Both hand their payloads to the extraction engine and
//! the sink one unit at a time.

pub mod keys;
pub mod log_query;
pub mod memory;
pub mod object_store;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;
use crate::schedule::TimeRange;
use crate::sink::ByteStream;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object whose key starts with `prefix`, across all pages.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, ProviderError>;

    /// At most `limit` objects under `prefix`. Used for probing layouts
    /// without walking a whole bucket.
    async fn sample(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ObjectInfo>, ProviderError> {
        let mut objects = self.list(bucket, prefix).await?;
        objects.truncate(limit);
        Ok(objects)
    }

    /// Stream an object's body exactly as stored.
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    Timeout,
    Unknown,
}

impl QueryStatus {
    /// Still worth polling.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Scheduled | Self::Running | Self::Unknown)
    }
}

/// One result row: field name and value pairs in service order.
pub type ResultRow = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPoll {
    pub status: QueryStatus,
    /// All rows produced so far. Each poll returns a superset of the last.
    pub rows: Vec<ResultRow>,
}

#[async_trait]
pub trait LogQueryService: Send + Sync {
    /// Submit a query over `bounds`. Returns the query id.
    async fn start_query(
        &self,
        log_group: &str,
        bounds: &TimeRange,
        query: &str,
    ) -> Result<String, ProviderError>;

    async fn poll_query(&self, query_id: &str) -> Result<QueryPoll, ProviderError>;

    /// Most rows one query can return. A query that completes with this
    /// many rows may have been cut short.
    fn row_limit(&self) -> Option<usize> {
        None
    }

    /// Best-effort cancellation of a running query.
    async fn stop_query(&self, _query_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}
