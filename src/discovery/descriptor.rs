use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a protected resource lives. CloudFront resources are global and
/// are managed through us-east-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceScope {
    Regional,
    CloudFront,
}

impl ResourceScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regional => "regional",
            Self::CloudFront => "cloudfront",
        }
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A web ACL as reported by the provider's listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectedResource {
    pub name: String,
    pub id: String,
    pub arn: String,
    pub scope: ResourceScope,
}

impl ProtectedResource {
    /// Account id embedded in the resource ARN, if well-formed.
    pub fn account_id(&self) -> Option<&str> {
        arn_field(&self.arn, 4)
    }

    pub fn region(&self) -> Option<&str> {
        arn_field(&self.arn, 3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationKind {
    ObjectStore,
    LogQueryService,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::ObjectStore => "object-store",
            Self::LogQueryService => "log-query-service",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Locator {
    ObjectStore { bucket: String, prefix: String },
    LogQueryService { log_group: String },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::ObjectStore { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
            Locator::LogQueryService { log_group } => write!(f, "logs:{}", log_group),
        }
    }
}

/// Where one resource's logs land. Built once per discovery pass and never
/// mutated; a later pass replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationDescriptor {
    pub resource: ProtectedResource,
    pub destination_arn: String,
    pub locator: Locator,
    pub region: String,
}

impl DestinationDescriptor {
    pub fn kind(&self) -> DestinationKind {
        match self.locator {
            Locator::ObjectStore { .. } => DestinationKind::ObjectStore,
            Locator::LogQueryService { .. } => DestinationKind::LogQueryService,
        }
    }

    pub fn scope(&self) -> ResourceScope {
        self.resource.scope
    }

    pub fn account_id(&self) -> Option<&str> {
        self.resource.account_id()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("destination '{0}' is neither an S3 bucket nor a CloudWatch Logs group")]
    Unrecognized(String),

    #[error("destination '{arn}' has no {missing}")]
    Incomplete { arn: String, missing: &'static str },
}

/// Classify a logging destination ARN by its service segment. Pure string
/// matching; no provider calls.
///
/// Returns the locator and the region named by the ARN, if any. S3 ARNs carry
/// no region.
pub fn classify(destination_arn: &str) -> Result<(Locator, Option<String>), ClassifyError> {
    let parts: Vec<&str> = destination_arn.split(':').collect();
    let service = parts.get(2).copied().unwrap_or_default();

    if parts.first() != Some(&"arn") || parts.len() < 6 {
        return Err(ClassifyError::Unrecognized(destination_arn.to_string()));
    }

    match service {
        "s3" => {
            let resource = parts[5..].join(":");
            let (bucket, prefix) = match resource.split_once('/') {
                Some((bucket, prefix)) => (bucket.to_string(), prefix.to_string()),
                None => (resource.clone(), String::new()),
            };
            if bucket.is_empty() {
                return Err(ClassifyError::Incomplete {
                    arn: destination_arn.to_string(),
                    missing: "bucket name",
                });
            }
            Ok((Locator::ObjectStore { bucket, prefix }, None))
        }
        "logs" => {
            // arn:aws:logs:<region>:<account>:log-group:<name>[:*]
            let log_group = match (parts.get(5), parts.get(6)) {
                (Some(&"log-group"), Some(name)) if !name.is_empty() => name.to_string(),
                _ => {
                    return Err(ClassifyError::Incomplete {
                        arn: destination_arn.to_string(),
                        missing: "log group name",
                    })
                }
            };
            let region = Some(parts[3]).filter(|r| !r.is_empty()).map(str::to_string);
            Ok((Locator::LogQueryService { log_group }, region))
        }
        _ => Err(ClassifyError::Unrecognized(destination_arn.to_string())),
    }
}

fn arn_field(arn: &str, index: usize) -> Option<&str> {
    arn.split(':')
        .nth(index)
        .filter(|field| !field.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_bucket_with_prefix() {
        let (locator, region) =
            classify("arn:aws:s3:::aws-waf-logs-acfc-24/AWSLogs/WAFLogs/ACFC_LB_WAF").unwrap();
        assert_eq!(
            locator,
            Locator::ObjectStore {
                bucket: "aws-waf-logs-acfc-24".to_string(),
                prefix: "AWSLogs/WAFLogs/ACFC_LB_WAF".to_string(),
            }
        );
        assert_eq!(region, None);
    }

    #[test]
    fn test_classify_bare_bucket() {
        let (locator, _) = classify("arn:aws:s3:::aws-waf-logs-site").unwrap();
        assert_eq!(
            locator,
            Locator::ObjectStore {
                bucket: "aws-waf-logs-site".to_string(),
                prefix: String::new(),
            }
        );
    }

    #[test]
    fn test_classify_log_group() {
        let (locator, region) = classify(
            "arn:aws:logs:eu-west-1:123456789012:log-group:aws-waf-logs-api:*",
        )
        .unwrap();
        assert_eq!(
            locator,
            Locator::LogQueryService {
                log_group: "aws-waf-logs-api".to_string()
            }
        );
        assert_eq!(region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_classify_unrecognized() {
        let arn = "arn:aws:firehose:us-east-1:123456789012:deliverystream/aws-waf-logs-x";
        assert_eq!(
            classify(arn),
            Err(ClassifyError::Unrecognized(arn.to_string()))
        );
        assert!(classify("not an arn").is_err());
        assert!(classify("").is_err());
    }

    #[test]
    fn test_classify_incomplete_log_group() {
        assert!(matches!(
            classify("arn:aws:logs:eu-west-1:123456789012:log-group:"),
            Err(ClassifyError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_resource_arn_fields() {
        let resource = ProtectedResource {
            name: "api".to_string(),
            id: "a1b2".to_string(),
            arn: "arn:aws:wafv2:eu-west-1:123456789012:regional/webacl/api/a1b2".to_string(),
            scope: ResourceScope::Regional,
        };
        assert_eq!(resource.account_id(), Some("123456789012"));
        assert_eq!(resource.region(), Some("eu-west-1"));
    }
}
