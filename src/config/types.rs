use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::ResourceScope;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Named profile from the shared credentials file.
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Endpoint override, for local emulators.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_scopes")]
    pub scopes: Vec<ResourceScope>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
        }
    }
}

fn default_scopes() -> Vec<ResourceScope> {
    vec![ResourceScope::Regional, ResourceScope::CloudFront]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_query_chunk", with = "humantime_serde")]
    pub query_chunk: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Per-unit deadline. Absent means no limit.
    #[serde(default = "default_unit_timeout", with = "humantime_serde")]
    pub unit_timeout: Option<Duration>,
    /// Overall run deadline. Absent means no limit.
    #[serde(default = "default_deadline", with = "humantime_serde")]
    pub deadline: Option<Duration>,
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default)]
    pub on_existing: OnExisting,
    #[serde(default)]
    pub confirm: ConfirmConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            query_chunk: default_query_chunk(),
            poll_interval: default_poll_interval(),
            unit_timeout: default_unit_timeout(),
            deadline: default_deadline(),
            query: default_query(),
            on_existing: OnExisting::default(),
            confirm: ConfirmConfig::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_query_chunk() -> Duration {
    Duration::from_secs(6 * 3600)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_unit_timeout() -> Option<Duration> {
    Some(Duration::from_secs(15 * 60))
}

fn default_deadline() -> Option<Duration> {
    Some(Duration::from_secs(30 * 60))
}

fn default_query() -> String {
    "fields @timestamp, @message, @ptr".to_string()
}

/// What to do when a unit's output is already present in the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExisting {
    #[default]
    Overwrite,
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ConfirmConfig {
    /// Ask on the terminal before downloading.
    #[default]
    Prompt,
    Auto,
    Threshold {
        max_objects: Option<u64>,
        max_bytes: Option<u64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_inner_field")]
    pub inner_field: String,
    #[serde(default = "default_pointer_field")]
    pub pointer_field: String,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[serde(default = "default_true")]
    pub validate_inner: bool,
    #[serde(default)]
    pub resync_on_line_start: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            inner_field: default_inner_field(),
            pointer_field: default_pointer_field(),
            timestamp_field: default_timestamp_field(),
            validate_inner: true,
            resync_on_line_start: false,
        }
    }
}

fn default_inner_field() -> String {
    "@message".to_string()
}

fn default_pointer_field() -> String {
    "@ptr".to_string()
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// Files older than this are removed by `sweep`. Absent disables the sweep.
    #[serde(default, with = "humantime_serde")]
    pub retention: Option<Duration>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: default_sink_path(),
            compress: true,
            compression_level: default_compression_level(),
            retention: None,
        }
    }
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("~/.local/share/wafsift")
}

fn default_compression_level() -> u32 {
    9
}
