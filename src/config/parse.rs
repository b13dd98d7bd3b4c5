use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use regex::Regex;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;
    parse_config(&raw)
}

/// Parse a config document: expand `$env{VAR}`, deserialize, expand `~`,
/// then validate.
pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(raw);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml)?
    };

    config.sink.path = expand_tilde(&config.sink.path);

    validate_config(&config)?;
    Ok(config)
}

fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let re = match Regex::new(ENV_VAR_PATTERN) {
        Ok(re) => re,
        Err(e) => return Err(ConfigError::Validation(e.to_string())),
    };
    let mut missing: Vec<String> = re
        .captures_iter(yaml)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort();
    missing.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         \n\
         Either export them or replace the $env{{...}} references in the config file",
        missing.join(", ")
    )))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_retrieval(&config.retrieval, &mut errors);
    validate_extraction(&config.extraction, &mut errors);

    if config.sink.compression_level > 9 {
        errors.push(format!(
            "sink.compression_level must be between 0 and 9, got {}",
            config.sink.compression_level
        ));
    }
    if config.sink.path.as_os_str().is_empty() {
        errors.push("sink.path must not be empty".to_string());
    }
    if config.sink.retention == Some(std::time::Duration::ZERO) {
        errors.push("sink.retention must be greater than zero".to_string());
    }

    if config.discovery.scopes.is_empty() {
        errors.push("discovery.scopes must name at least one scope".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_retrieval(retrieval: &RetrievalConfig, errors: &mut Vec<String>) {
    if retrieval.concurrency == 0 {
        errors.push("retrieval.concurrency must be at least 1".to_string());
    }
    if retrieval.query_chunk.is_zero() {
        errors.push("retrieval.query_chunk must be greater than zero".to_string());
    }
    if retrieval.poll_interval.is_zero() {
        errors.push("retrieval.poll_interval must be greater than zero".to_string());
    }
    if retrieval.unit_timeout.is_some_and(|d| d.is_zero()) {
        errors.push("retrieval.unit_timeout must be greater than zero".to_string());
    }
    if retrieval.deadline.is_some_and(|d| d.is_zero()) {
        errors.push("retrieval.deadline must be greater than zero".to_string());
    }
    if retrieval.query.trim().is_empty() {
        errors.push("retrieval.query must not be empty".to_string());
    }
    if let ConfirmConfig::Threshold {
        max_objects: None,
        max_bytes: None,
    } = retrieval.confirm
    {
        errors.push(
            "retrieval.confirm: threshold mode needs max_objects or max_bytes".to_string(),
        );
    }
}

fn validate_extraction(extraction: &ExtractionConfig, errors: &mut Vec<String>) {
    for (name, value) in [
        ("inner_field", &extraction.inner_field),
        ("pointer_field", &extraction.pointer_field),
        ("timestamp_field", &extraction.timestamp_field),
    ] {
        if value.is_empty() {
            errors.push(format!("extraction.{} must not be empty", name));
        }
    }
    if extraction.inner_field == extraction.pointer_field
        || extraction.inner_field == extraction.timestamp_field
    {
        errors.push(format!(
            "extraction.inner_field '{}' must differ from the metadata fields",
            extraction.inner_field
        ));
    }
}
