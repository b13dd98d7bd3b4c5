use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::aws::AwsSession;
use crate::config::{load_config, parse_config, Config, ConfigError};
use crate::discovery::DiscoveryError;
use crate::error::ProviderError;
use crate::schedule::ScheduleError;
use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("AWS session error: {0}")]
    Session(#[from] ProviderError),

    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    #[error("scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("no logging destination found for resource '{0}'; run 'wafsift discover' to list them")]
    ResourceNotFound(String),

    #[error("no retention configured; set sink.retention or pass --older-than")]
    NoRetention,

    #[error("retrieval failed: {0}")]
    HardFailure(String),
}

/// Load the config at `path`, or defaults when no config file was found.
pub fn load(path: Option<&Path>) -> Result<Config, RunError> {
    match path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Ok(load_config(path)?)
        }
        None => {
            info!("No config file found, using defaults");
            Ok(parse_config("")?)
        }
    }
}

pub async fn connect(config: &Config) -> Result<AwsSession, RunError> {
    Ok(AwsSession::connect(&config.aws).await?)
}
