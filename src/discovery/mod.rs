//! Maps web ACLs to the destination their logging is routed to.

mod descriptor;

pub use descriptor::{
    classify, ClassifyError, DestinationDescriptor, DestinationKind, Locator, ProtectedResource,
    ResourceScope,
};

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Read-only view of the provider's resource and logging configuration.
#[async_trait]
pub trait LoggingConfigApi: Send + Sync {
    /// Region used when neither the destination nor the resource names one.
    fn default_region(&self) -> &str;

    async fn list_resources(
        &self,
        scope: ResourceScope,
    ) -> Result<Vec<ProtectedResource>, ProviderError>;

    /// Destination ARNs the resource logs to, or `None` when logging is not
    /// configured for it.
    async fn logging_destinations(
        &self,
        resource: &ProtectedResource,
    ) -> Result<Option<Vec<String>>, ProviderError>;
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("provider error during discovery: {0}")]
    Provider(#[from] ProviderError),
}

/// A resource left out of the discovery result, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryWarning {
    /// Resource name, or the scope when a whole listing failed.
    pub subject: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub descriptors: Vec<DestinationDescriptor>,
    pub warnings: Vec<DiscoveryWarning>,
}

impl DiscoveryReport {
    /// Descriptors whose resource name matches, in discovery order.
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DestinationDescriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.resource.name == name || d.resource.id == name)
    }
}

/// Run one discovery pass over the given scopes.
///
/// Only an unreachable or unauthorized provider fails the pass. Resources
/// without logging are dropped silently; unrecognized destinations and
/// other per-resource errors become warnings.
pub async fn discover(
    api: &dyn LoggingConfigApi,
    scopes: &[ResourceScope],
) -> Result<DiscoveryReport, DiscoveryError> {
    let mut report = DiscoveryReport::default();

    for &scope in scopes {
        let resources = match api.list_resources(scope).await {
            Ok(resources) => resources,
            Err(e) if e.kind.is_fatal_for_discovery() => return Err(e.into()),
            Err(e) => {
                warn!(scope = %scope, error = %e, "Listing resources failed");
                report.warnings.push(DiscoveryWarning {
                    subject: format!("{} scope", scope),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        debug!(scope = %scope, count = resources.len(), "Listed resources");

        for resource in resources {
            let arns = match api.logging_destinations(&resource).await {
                Ok(Some(arns)) => arns,
                Ok(None) => {
                    debug!(resource = %resource.name, "Logging not configured");
                    continue;
                }
                Err(e) if e.kind.is_fatal_for_discovery() => return Err(e.into()),
                Err(e) => {
                    warn!(resource = %resource.name, error = %e, "Reading logging configuration failed");
                    report.warnings.push(DiscoveryWarning {
                        subject: resource.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for arn in arns {
                match classify(&arn) {
                    Ok((locator, arn_region)) => {
                        let region = arn_region
                            .or_else(|| resource.region().map(str::to_string))
                            .unwrap_or_else(|| api.default_region().to_string());
                        report.descriptors.push(DestinationDescriptor {
                            resource: resource.clone(),
                            destination_arn: arn,
                            locator,
                            region,
                        });
                    }
                    Err(e) => {
                        warn!(resource = %resource.name, error = %e, "Skipping unsupported destination");
                        report.warnings.push(DiscoveryWarning {
                            subject: resource.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    info!(
        destinations = report.descriptors.len(),
        warnings = report.warnings.len(),
        "Discovery complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryLoggingConfig;
    use crate::error::ProviderErrorKind;

    fn resource(name: &str, scope: ResourceScope) -> ProtectedResource {
        let region = match scope {
            ResourceScope::Regional => "eu-west-1",
            ResourceScope::CloudFront => "us-east-1",
        };
        ProtectedResource {
            name: name.to_string(),
            id: format!("{}-id", name),
            arn: format!(
                "arn:aws:wafv2:{}:123456789012:{}/webacl/{}/{}-id",
                region,
                if scope == ResourceScope::Regional { "regional" } else { "global" },
                name,
                name
            ),
            scope,
        }
    }

    #[tokio::test]
    async fn test_discover_mixed_destinations() {
        let api = MemoryLoggingConfig::new("ap-southeast-1")
            .with_resource(
                resource("api", ResourceScope::Regional),
                Some(vec!["arn:aws:s3:::aws-waf-logs-api/edge".to_string()]),
            )
            .with_resource(
                resource("site", ResourceScope::CloudFront),
                Some(vec![
                    "arn:aws:logs:us-east-1:123456789012:log-group:aws-waf-logs-site".to_string(),
                ]),
            )
            .with_resource(resource("quiet", ResourceScope::Regional), None)
            .with_resource(
                resource("stream", ResourceScope::Regional),
                Some(vec![
                    "arn:aws:firehose:eu-west-1:123456789012:deliverystream/aws-waf-logs-s"
                        .to_string(),
                ]),
            );

        let report = discover(&api, &[ResourceScope::Regional, ResourceScope::CloudFront])
            .await
            .unwrap();

        assert_eq!(report.descriptors.len(), 2);
        let api_desc = report.find("api").next().unwrap();
        assert_eq!(api_desc.kind(), DestinationKind::ObjectStore);
        assert_eq!(api_desc.region, "eu-west-1");
        let site = report.find("site").next().unwrap();
        assert_eq!(site.kind(), DestinationKind::LogQueryService);
        assert_eq!(site.scope(), ResourceScope::CloudFront);

        // The firehose destination is a warning, the unlogged ACL is silent
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].subject, "stream");
    }

    #[tokio::test]
    async fn test_discover_scope_filter() {
        let api = MemoryLoggingConfig::new("eu-west-1")
            .with_resource(
                resource("api", ResourceScope::Regional),
                Some(vec!["arn:aws:s3:::aws-waf-logs-api".to_string()]),
            )
            .with_resource(
                resource("site", ResourceScope::CloudFront),
                Some(vec!["arn:aws:s3:::aws-waf-logs-site".to_string()]),
            );

        let report = discover(&api, &[ResourceScope::CloudFront]).await.unwrap();
        assert_eq!(report.descriptors.len(), 1);
        assert_eq!(report.descriptors[0].resource.name, "site");
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal() {
        let api = MemoryLoggingConfig::new("eu-west-1").failing_listing(
            ResourceScope::Regional,
            ProviderError::new("ListWebACLs", ProviderErrorKind::Unauthorized, "denied"),
        );
        let result = discover(&api, &[ResourceScope::Regional]).await;
        assert!(matches!(result, Err(DiscoveryError::Provider(_))));
    }

    #[tokio::test]
    async fn test_throttled_listing_is_a_warning() {
        let api = MemoryLoggingConfig::new("eu-west-1")
            .failing_listing(
                ResourceScope::CloudFront,
                ProviderError::new("ListWebACLs", ProviderErrorKind::Throttled, "rate"),
            )
            .with_resource(
                resource("api", ResourceScope::Regional),
                Some(vec!["arn:aws:s3:::aws-waf-logs-api".to_string()]),
            );
        let report = discover(&api, &[ResourceScope::Regional, ResourceScope::CloudFront])
            .await
            .unwrap();
        assert_eq!(report.descriptors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].subject, "cloudfront scope");
    }
}
