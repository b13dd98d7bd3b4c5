use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::StreamExt;

use super::{validate_key, ByteStream, Sink, SinkError, SweepReport};

/// Uncompressed sink held in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<BTreeMap<String, (Vec<u8>, SystemTime)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (Vec<u8>, SystemTime)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every stored key and its bytes.
    pub fn contents(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries()
            .iter()
            .map(|(k, (v, _))| (k.clone(), v.clone()))
            .collect()
    }

    /// Backdate an entry, for retention tests.
    pub fn set_modified(&self, key: &str, at: SystemTime) {
        if let Some(entry) = self.entries().get_mut(key) {
            entry.1 = at;
        }
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn stored_key(&self, key: &str) -> String {
        key.to_string()
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<String, SinkError> {
        validate_key(key)?;
        self.entries()
            .insert(key.to_string(), (bytes.to_vec(), SystemTime::now()));
        Ok(key.to_string())
    }

    async fn write_stream(&self, key: &str, mut stream: ByteStream) -> Result<u64, SinkError> {
        validate_key(key)?;
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let len = buf.len() as u64;
        self.entries().insert(key.to_string(), (buf, SystemTime::now()));
        Ok(len)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, SinkError> {
        self.entries()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| SinkError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, SinkError> {
        Ok(self.entries().contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SinkError> {
        Ok(self
            .entries()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn sweep(&self, max_age: Duration) -> Result<SweepReport, SinkError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = SweepReport::default();
        self.entries().retain(|_, (bytes, modified)| {
            if *modified < cutoff {
                report.removed += 1;
                report.bytes_freed += bytes.len() as u64;
                false
            } else {
                true
            }
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_by_age() {
        let sink = MemorySink::new();
        sink.write("a/old", b"abc").await.unwrap();
        sink.write("a/new", b"d").await.unwrap();
        sink.set_modified("a/old", SystemTime::now() - Duration::from_secs(7200));

        let report = sink.sweep(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(report, SweepReport { removed: 1, bytes_freed: 3 });
        assert_eq!(sink.list("a/").await.unwrap(), vec!["a/new"]);
    }
}
