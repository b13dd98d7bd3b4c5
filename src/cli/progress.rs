use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use console::Term;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const REFRESH: Duration = Duration::from_millis(500);

/// Renders a byte count as `12.3 MB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Background task redrawing the downloaded byte count on stderr.
pub struct ProgressReporter {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(counter: Arc<AtomicU64>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            if !term.is_term() {
                return;
            }
            let mut shown = 0u64;
            let mut interval = tokio::time::interval(REFRESH);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let now = counter.load(Ordering::Relaxed);
                if now != shown {
                    shown = now;
                    let _ = term.clear_line();
                    let _ = term.write_str(&format!("Downloaded {}", human_bytes(now)));
                }
            }
            if shown > 0 {
                let _ = term.clear_line();
            }
        });
        Self { cancel, handle }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.5 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
