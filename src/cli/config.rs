use console::style;
use std::fs;
use std::path::{Path, PathBuf};

use super::run::load;
use super::RunError;
use crate::config::generate::generate_starter_config;
use crate::config::{user_config_path, SYSTEM_CONFIG_PATH};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try ~/.config/wafsift/config.yml first
    let config_path = match user_config_path() {
        Some(user_config) => match user_config.parent().map(fs::create_dir_all) {
            Some(Err(_)) => {
                eprintln!("Warning: Could not create directory for {}", user_config.display());
                eprintln!("Falling back to {}", SYSTEM_CONFIG_PATH);
                None
            }
            _ => Some(user_config),
        },
        None => None,
    };
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_PATH));

    if config_path.exists() {
        return Err(format!(
            "config file already exists at {}; remove it first or use --stdout",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

pub fn validate(config_path: Option<&Path>) -> Result<(), RunError> {
    let path = config_path.ok_or_else(|| {
        RunError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no config file found; use --config to specify a path",
        ))
    })?;

    println!("Validating config file: {}", path.display());
    let config = load(Some(path))?;

    println!("{}", style("✓ Config is valid").green());
    println!("  scopes: {:?}", config.discovery.scopes);
    println!(
        "  concurrency: {}, query chunk: {}",
        config.retrieval.concurrency,
        humantime::format_duration(config.retrieval.query_chunk)
    );
    println!("  sink: {}", config.sink.path.display());
    Ok(())
}
