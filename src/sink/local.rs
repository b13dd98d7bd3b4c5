use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{validate_key, ByteStream, Sink, SinkError, SweepReport};
use crate::config::SinkConfig;

/// Sink rooted at a local directory. Keys map to paths below the root.
///
/// Every write goes to a hidden temporary file next to its target and is
/// renamed into place, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct LocalSink {
    root: PathBuf,
    compression: Option<Compression>,
}

impl LocalSink {
    pub fn new(root: impl Into<PathBuf>, compress: bool, level: u32) -> Result<Self, SinkError> {
        if level > 9 {
            return Err(SinkError::InvalidLevel(level));
        }
        Ok(Self {
            root: root.into(),
            compression: compress.then(|| Compression::new(level)),
        })
    }

    pub fn from_config(config: &SinkConfig) -> Result<Self, SinkError> {
        Self::new(&config.path, config.compress, config.compression_level)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SinkError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn prepare(&self, path: &Path) -> Result<PathBuf, SinkError> {
        let parent = path.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(parent.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple())))
    }

    async fn commit(&self, tmp: &Path, path: &Path) -> Result<(), SinkError> {
        if let Err(e) = tokio::fs::rename(tmp, path).await {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(io_error(path, e));
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for LocalSink {
    fn stored_key(&self, key: &str) -> String {
        match self.compression {
            Some(_) => format!("{}.gz", key),
            None => key.to_string(),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<String, SinkError> {
        let stored = self.stored_key(key);
        let path = self.path_for(&stored)?;

        let data = match self.compression {
            Some(level) => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 4), level);
                encoder
                    .write_all(bytes)
                    .and_then(|_| encoder.finish())
                    .map_err(|e| io_error(&path, e))?
            }
            None => bytes.to_vec(),
        };

        let tmp = self.prepare(&path).await?;
        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&tmp, e));
        }
        self.commit(&tmp, &path).await?;

        debug!(key = %stored, bytes = data.len(), "Wrote sink entry");
        Ok(stored)
    }

    async fn write_stream(&self, key: &str, mut stream: ByteStream) -> Result<u64, SinkError> {
        let path = self.path_for(key)?;
        let tmp = self.prepare(&path).await?;

        let result: Result<u64, SinkError> = async {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .map_err(|e| io_error(&tmp, e))?;
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| io_error(&tmp, e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| io_error(&tmp, e))?;
            file.sync_all().await.map_err(|e| io_error(&tmp, e))?;
            Ok(written)
        }
        .await;

        match result {
            Ok(written) => {
                self.commit(&tmp, &path).await?;
                debug!(key = %key, bytes = written, "Streamed sink entry");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, SinkError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SinkError::NotFound(key.to_string()),
            _ => io_error(&path, e),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, SinkError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SinkError> {
        let root = self.root.clone();
        let files = walk(root.clone()).await?;

        let mut keys: Vec<String> = files
            .into_iter()
            .filter_map(|(path, _)| relative_key(&root, &path))
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn sweep(&self, max_age: Duration) -> Result<SweepReport, SinkError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = SweepReport::default();

        for (path, meta) in walk(self.root.clone()).await? {
            let modified = match meta.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "No modification time, skipping");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report.removed += 1;
                    report.bytes_freed += meta.len();
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove expired file"),
            }
        }

        info!(
            removed = report.removed,
            bytes_freed = report.bytes_freed,
            max_age = %humantime::format_duration(max_age),
            "Retention sweep complete"
        );
        Ok(report)
    }
}

/// Every regular file below `root`, skipping in-progress temporary files.
async fn walk(root: PathBuf) -> Result<Vec<(PathBuf, std::fs::Metadata)>, SinkError> {
    let handle_root = root.clone();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&dir, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| io_error(&dir, e))?;
                let path = entry.path();
                let meta = entry.metadata().map_err(|e| io_error(&path, e))?;
                if meta.is_dir() {
                    stack.push(path);
                } else if meta.is_file() && !is_temporary(&path) {
                    files.push((path, meta));
                }
            }
        }
        Ok(files)
    })
    .await
    .map_err(|e| io_error(&handle_root, std::io::Error::other(e)))?
}

fn is_temporary(path: &Path) -> bool {
    path.file_name()
        .map(|n| {
            let n = n.to_string_lossy();
            n.starts_with('.') && n.ends_with(".tmp")
        })
        .unwrap_or(false)
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ProviderErrorKind};
    use crate::extract::decompress_if_gzip;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_compressed_roundtrip() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path(), true, 6).unwrap();

        let stored = sink.write("acct/api/2025-01-01/00/a.ndjson", b"{\"x\":1}\n").await.unwrap();
        assert_eq!(stored, "acct/api/2025-01-01/00/a.ndjson.gz");
        assert!(sink.exists(&stored).await.unwrap());
        assert!(!sink.exists("acct/api/2025-01-01/00/a.ndjson").await.unwrap());

        let raw = sink.read(&stored).await.unwrap();
        assert_eq!(&*decompress_if_gzip(&raw).unwrap(), b"{\"x\":1}\n");
    }

    #[tokio::test]
    async fn test_write_uncompressed() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path(), false, 9).unwrap();
        let stored = sink.write("a/b.json", b"hello").await.unwrap();
        assert_eq!(stored, "a/b.json");
        assert_eq!(sink.read("a/b.json").await.unwrap(), b"hello");
    }

    #[test]
    fn test_invalid_level() {
        assert!(matches!(
            LocalSink::new("/tmp/x", true, 10),
            Err(SinkError::InvalidLevel(10))
        ));
    }

    #[tokio::test]
    async fn test_stream_is_stored_unchanged() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path(), true, 9).unwrap();
        let chunks: Vec<Result<Bytes, ProviderError>> =
            vec![Ok(Bytes::from_static(b"\x1f\x8b")), Ok(Bytes::from_static(b"rest"))];

        let written = sink
            .write_stream("acct/raw.log.gz", stream::iter(chunks).boxed())
            .await
            .unwrap();
        assert_eq!(written, 6);
        assert_eq!(sink.read("acct/raw.log.gz").await.unwrap(), b"\x1f\x8brest");
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path(), false, 9).unwrap();
        let chunks: Vec<Result<Bytes, ProviderError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(ProviderError::new("GetObject", ProviderErrorKind::Unreachable, "reset")),
        ];

        let result = sink
            .write_stream("acct/raw.log", stream::iter(chunks).boxed())
            .await;
        assert!(matches!(result, Err(SinkError::Source(_))));
        assert!(!sink.exists("acct/raw.log").await.unwrap());
        assert!(sink.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path(), false, 9).unwrap();
        for key in ["acct/api/2025-01-01/00/a", "acct/api/2025-01-01/01/b", "acct/web/x"] {
            sink.write(key, b"1").await.unwrap();
        }

        assert_eq!(
            sink.list("acct/api/").await.unwrap(),
            vec!["acct/api/2025-01-01/00/a", "acct/api/2025-01-01/01/b"]
        );
        assert_eq!(sink.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sweep_removes_old_files() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path(), false, 9).unwrap();
        sink.write("old/file", b"12345").await.unwrap();
        sink.write("new/file", b"1").await.unwrap();

        let old_path = dir.path().join("old/file");
        let past = SystemTime::now() - Duration::from_secs(3 * 86400);
        std::fs::File::options()
            .write(true)
            .open(&old_path)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let report = sink.sweep(Duration::from_secs(86400)).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.bytes_freed, 5);
        assert!(!old_path.exists());
        assert!(sink.exists("new/file").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let sink = LocalSink::new(dir.path(), false, 9).unwrap();
        assert!(matches!(
            sink.write("../outside", b"x").await,
            Err(SinkError::InvalidKey(_))
        ));
    }
}
