use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Broad class of a provider call failure. Callers decide fatality by kind,
/// never by message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Transport failure, DNS, connect timeout, no endpoint.
    Unreachable,
    /// Missing or rejected credentials, access denied.
    Unauthorized,
    NotFound,
    Throttled,
    /// A per-unit deadline elapsed.
    Timeout,
    /// The run was cancelled before the call finished.
    Cancelled,
    /// The response could not be interpreted.
    Malformed,
    /// Any other service-side error.
    Service,
}

impl ProviderErrorKind {
    /// Whether a discovery pass can continue past this error.
    pub fn is_fatal_for_discovery(self) -> bool {
        matches!(self, Self::Unreachable | Self::Unauthorized)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreachable => "unreachable",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::Throttled => "throttled",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Malformed => "malformed response",
            Self::Service => "service error",
        };
        f.write_str(s)
    }
}

/// Error from any provider call (logging config, object store, log query).
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{operation}: {kind}: {message}")]
pub struct ProviderError {
    pub operation: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        operation: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::new(
            operation,
            ProviderErrorKind::Timeout,
            format!("no result after {}", humantime::format_duration(after)),
        )
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::new(
            operation,
            ProviderErrorKind::Cancelled,
            "run deadline reached",
        )
    }

    pub fn malformed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, ProviderErrorKind::Malformed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_operation_and_kind() {
        let err = ProviderError::new("ListObjectsV2", ProviderErrorKind::Throttled, "slow down");
        assert_eq!(err.to_string(), "ListObjectsV2: throttled: slow down");
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ProviderErrorKind::Unreachable.is_fatal_for_discovery());
        assert!(ProviderErrorKind::Unauthorized.is_fatal_for_discovery());
        assert!(!ProviderErrorKind::NotFound.is_fatal_for_discovery());
        assert!(!ProviderErrorKind::Throttled.is_fatal_for_discovery());
    }

    #[test]
    fn test_timeout_message() {
        let err = ProviderError::timeout("unit 3", std::time::Duration::from_secs(90));
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert_eq!(err.message, "no result after 1m 30s");
    }
}
