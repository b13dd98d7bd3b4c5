//! Durable local storage for retrieved payloads and extracted records.
//!
//! Keys are relative, `/`-separated paths built with [`KeySpace`]. Every
//! work unit writes to keys no other unit touches, so implementations only
//! need to be safe for concurrent writes to distinct keys.

mod keys;
mod local;
mod memory;

pub use keys::KeySpace;
pub use local::LocalSink;
pub use memory::MemorySink;

use crate::error::ProviderError;
use crate::extract::ExtractedRecord;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Byte chunks arriving from a provider download.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid sink key '{0}'")]
    InvalidKey(String),

    #[error("compression level {0} is out of range 0-9")]
    InvalidLevel(u32),

    #[error("no entry for key '{0}'")]
    NotFound(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stream being written failed before it finished.
    #[error("source stream failed: {0}")]
    Source(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: u64,
    pub bytes_freed: u64,
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// The key `write` actually stores `key` under (a compressing sink adds
    /// a `.gz` suffix).
    fn stored_key(&self, key: &str) -> String;

    /// Write `bytes` at `key`, compressed if the sink compresses. Returns the
    /// stored key. Replaces any existing entry.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<String, SinkError>;

    /// Copy a stream to `key` unchanged. Returns the number of bytes written.
    /// Nothing is left at `key` if the stream fails.
    async fn write_stream(&self, key: &str, stream: ByteStream) -> Result<u64, SinkError>;

    /// Stored bytes at `key`, exactly as written.
    async fn read(&self, key: &str) -> Result<Vec<u8>, SinkError>;

    async fn exists(&self, key: &str) -> Result<bool, SinkError>;

    /// Stored keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SinkError>;

    /// Remove entries last modified more than `max_age` ago.
    async fn sweep(&self, max_age: Duration) -> Result<SweepReport, SinkError>;
}

/// Write records as newline-delimited JSON at `key`. Writes nothing for an
/// empty batch.
pub async fn write_records(
    sink: &dyn Sink,
    key: &str,
    records: &[ExtractedRecord],
) -> Result<Option<String>, SinkError> {
    if records.is_empty() {
        return Ok(None);
    }
    let mut buf = String::with_capacity(records.iter().map(|r| r.body.len() + 1).sum());
    for record in records {
        buf.push_str(&record.body);
        buf.push('\n');
    }
    sink.write(key, buf.as_bytes()).await.map(Some)
}

/// Reject keys that could escape the sink root.
pub(crate) fn validate_key(key: &str) -> Result<(), SinkError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(SinkError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("acct/api/2025-01-01/00/file.json").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/./b").is_err());
        assert!(validate_key("a\\b").is_err());
    }
}
