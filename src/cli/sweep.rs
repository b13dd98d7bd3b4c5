use std::path::Path;
use std::time::Duration;

use super::progress::human_bytes;
use super::run::load;
use super::RunError;
use crate::sink::{LocalSink, Sink};

/// Delete stored files older than `older_than`, or the configured retention.
pub async fn sweep(config_path: Option<&Path>, older_than: Option<Duration>) -> Result<(), RunError> {
    let config = load(config_path)?;
    let max_age = older_than
        .or(config.sink.retention)
        .ok_or(RunError::NoRetention)?;

    let sink = LocalSink::from_config(&config.sink)?;
    let report = sink.sweep(max_age).await?;

    println!(
        "Removed {} files ({}) older than {} from {}",
        report.removed,
        human_bytes(report.bytes_freed),
        humantime::format_duration(max_age),
        sink.root().display()
    );
    Ok(())
}
