pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# WAFSIFT CONFIGURATION
# =============================================================================
# Retrieves web ACL logs from S3 or CloudWatch Logs and recovers the individual
# JSON records into a local directory.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/wafsift/config.yml
#   3. /etc/wafsift/config.yml
#
# Any value may reference an environment variable as $env{...}.

# =============================================================================
# AWS SESSION
# =============================================================================
# All keys are optional. Without them the default credential chain and region
# are used.

#   profile: security-audit
#   region: eu-west-1
#   endpoint: http://localhost:4566

aws: {}

# =============================================================================
# DISCOVERY
# =============================================================================
# Which web ACL scopes to inspect: 'regional', 'cloudfront'

discovery:
  scopes: [regional, cloudfront]

# =============================================================================
# RETRIEVAL
# =============================================================================

retrieval:
  # Maximum number of work units in flight at once
  concurrency: 4
  # CloudWatch Logs ranges are split into chunks of this size, one query each
  query_chunk: 6h
  # How often a running query is polled
  poll_interval: 5s
  # A single unit that runs longer than this is recorded as failed
  unit_timeout: 15m
  # Overall limit for one run; remove for no limit
  deadline: 30m
  query: "fields @timestamp, @message, @ptr"
  # When a unit's output already exists: 'overwrite' or 'skip'
  on_existing: overwrite
  # Gate before S3 downloads:
  #   mode: prompt                  ask on the terminal
  #   mode: auto                    always proceed
  #   mode: threshold               proceed only below the limits
  #   max_objects: 1000
  #   max_bytes: 1073741824
  confirm:
    mode: prompt

# =============================================================================
# EXTRACTION
# =============================================================================

extraction:
  # Field of the wrapper object holding the serialized record
  inner_field: "@message"
  pointer_field: "@ptr"
  timestamp_field: "@timestamp"
  # Re-parse the inner record as JSON before keeping it
  validate_inner: true
  # Start a new object at a '{' in column 0 even if the previous one is open.
  # Only for exports of single-line records; pretty-printed records can nest
  # an object in column 0.
  resync_on_line_start: false

# =============================================================================
# LOCAL SINK
# =============================================================================

sink:
  path: ~/.local/share/wafsift
  compress: true
  # gzip level, 0 (none) to 9 (best)
  compression_level: 9
  # 'wafsift sweep' deletes files older than this
  retention: 30days
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::config::ConfirmConfig;

    #[test]
    fn test_starter_config_is_valid() {
        let config = parse_config(&generate_starter_config()).unwrap();
        assert_eq!(config.retrieval.concurrency, 4);
        assert_eq!(config.retrieval.confirm, ConfirmConfig::Prompt);
        assert_eq!(
            config.sink.retention,
            Some(std::time::Duration::from_secs(30 * 86400))
        );
    }
}
