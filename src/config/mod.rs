pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{
    AwsConfig, Config, ConfirmConfig, DiscoveryConfig, ExtractionConfig, OnExisting,
    RetrievalConfig, SinkConfig,
};

/// Matches `$env{VAR_NAME}`.
pub(crate) const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Expands `$env{VAR_NAME}` references. Unset variables are left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    let re = match Regex::new(ENV_VAR_PATTERN) {
        Ok(re) => re,
        Err(_) => return text.to_string(),
    };

    re.replace_all(text, |caps: &regex::Captures| {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        caps.get(1)
            .and_then(|name| std::env::var(name.as_str()).ok())
            .unwrap_or_else(|| whole.to_string())
    })
    .to_string()
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path. Returns the first of:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/wafsift/config.yml
/// 3. /etc/wafsift/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

pub const SYSTEM_CONFIG_PATH: &str = "/etc/wafsift/config.yml";

pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/wafsift/config.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_expand_env_vars_multiple() {
        std::env::set_var("WAFSIFT_VAR1", "value1");
        std::env::set_var("WAFSIFT_VAR2", "value2");
        let result = expand_env_vars("$env{WAFSIFT_VAR1}/middle/$env{WAFSIFT_VAR2}");
        assert_eq!(result, "value1/middle/value2");
        std::env::remove_var("WAFSIFT_VAR1");
        std::env::remove_var("WAFSIFT_VAR2");
    }

    #[test]
    fn test_expand_env_vars_unset_left_alone() {
        let result = expand_env_vars("path/$env{WAFSIFT_NONEXISTENT}/file");
        assert_eq!(result, "path/$env{WAFSIFT_NONEXISTENT}/file");
    }

    #[test]
    fn test_expand_env_vars_ignores_query_fields() {
        let query = "fields @timestamp, @message | filter action = 'BLOCK'";
        assert_eq!(expand_env_vars(query), query);
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/waf/logs")), home.join("waf/logs"));
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
        assert_eq!(expand_tilde(Path::new("/abs/path")), Path::new("/abs/path"));
        assert_eq!(expand_tilde(Path::new("rel/~/x")), Path::new("rel/~/x"));
    }

    #[test]
    fn test_resolve_explicit_path_wins() {
        let resolved = resolve_config_path(Some(Path::new("/tmp/custom.yml")));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/custom.yml")));
    }
}
