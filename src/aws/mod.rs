//! AWS SDK implementations of the provider traits.

mod logs;
mod s3;
mod session;
mod wafv2;

pub use logs::CloudWatchLogsQuery;
pub use s3::S3Store;
pub use session::AwsSession;
pub use wafv2::WafLoggingConfig;

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::error::{ProviderError, ProviderErrorKind};

/// Convert an SDK failure into a [`ProviderError`], classifying by transport
/// failure or service error code.
pub(crate) fn provider_error<E, R>(operation: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let kind = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ProviderErrorKind::Unreachable,
        SdkError::ResponseError(_) => ProviderErrorKind::Malformed,
        SdkError::ServiceError(_) => kind_for_code(err.code()),
        _ => ProviderErrorKind::Service,
    };
    ProviderError::new(operation, kind, DisplayErrorContext(&err).to_string())
}

fn kind_for_code(code: Option<&str>) -> ProviderErrorKind {
    match code.unwrap_or_default() {
        "AccessDenied"
        | "AccessDeniedException"
        | "UnrecognizedClientException"
        | "InvalidClientTokenId"
        | "InvalidAccessKeyId"
        | "SignatureDoesNotMatch"
        | "ExpiredToken"
        | "ExpiredTokenException"
        | "WAFUnavailableEntityException" => ProviderErrorKind::Unauthorized,
        "Throttling"
        | "ThrottlingException"
        | "SlowDown"
        | "TooManyRequestsException"
        | "LimitExceededException" => ProviderErrorKind::Throttled,
        "NoSuchKey" | "NoSuchBucket" | "NotFound" | "ResourceNotFoundException"
        | "WAFNonexistentItemException" => ProviderErrorKind::NotFound,
        "MalformedQueryException" | "InvalidParameterException" => ProviderErrorKind::Malformed,
        _ => ProviderErrorKind::Service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_code() {
        assert_eq!(kind_for_code(Some("AccessDenied")), ProviderErrorKind::Unauthorized);
        assert_eq!(kind_for_code(Some("ExpiredTokenException")), ProviderErrorKind::Unauthorized);
        assert_eq!(kind_for_code(Some("ThrottlingException")), ProviderErrorKind::Throttled);
        assert_eq!(kind_for_code(Some("NoSuchKey")), ProviderErrorKind::NotFound);
        assert_eq!(kind_for_code(Some("InternalFailure")), ProviderErrorKind::Service);
        assert_eq!(kind_for_code(None), ProviderErrorKind::Service);
    }
}
