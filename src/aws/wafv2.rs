use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use aws_sdk_wafv2::types::Scope;
use aws_sdk_wafv2::Client;
use tracing::debug;

use super::provider_error;
use crate::discovery::{LoggingConfigApi, ProtectedResource, ResourceScope};
use crate::error::ProviderError;

/// CloudFront web ACLs are only visible through this region.
const CLOUDFRONT_REGION: &str = "us-east-1";

const PAGE_SIZE: i32 = 100;

/// Web ACL listing and logging configuration through WAFv2.
pub struct WafLoggingConfig {
    regional: Client,
    cloudfront: Client,
    region: String,
}

impl WafLoggingConfig {
    pub fn new(sdk: &SdkConfig, region: &str) -> Self {
        let cloudfront = aws_sdk_wafv2::config::Builder::from(sdk)
            .region(Region::new(CLOUDFRONT_REGION))
            .build();
        Self {
            regional: Client::new(sdk),
            cloudfront: Client::from_conf(cloudfront),
            region: region.to_string(),
        }
    }

    fn client(&self, scope: ResourceScope) -> &Client {
        match scope {
            ResourceScope::Regional => &self.regional,
            ResourceScope::CloudFront => &self.cloudfront,
        }
    }
}

fn sdk_scope(scope: ResourceScope) -> Scope {
    match scope {
        ResourceScope::Regional => Scope::Regional,
        ResourceScope::CloudFront => Scope::Cloudfront,
    }
}

#[async_trait]
impl LoggingConfigApi for WafLoggingConfig {
    fn default_region(&self) -> &str {
        &self.region
    }

    async fn list_resources(&self, scope: ResourceScope) -> Result<Vec<ProtectedResource>, ProviderError> {
        let mut resources = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client(scope)
                .list_web_acls()
                .scope(sdk_scope(scope))
                .limit(PAGE_SIZE)
                .set_next_marker(marker.take())
                .send()
                .await
                .map_err(|e| provider_error("ListWebACLs", e))?;

            let page = resp.web_acls();
            for acl in page {
                let (Some(name), Some(id), Some(arn)) = (acl.name(), acl.id(), acl.arn()) else {
                    continue;
                };
                resources.push(ProtectedResource {
                    name: name.to_string(),
                    id: id.to_string(),
                    arn: arn.to_string(),
                    scope,
                });
            }

            match resp.next_marker() {
                Some(next) if !page.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(scope = %scope, count = resources.len(), "Listed web ACLs");
        Ok(resources)
    }

    async fn logging_destinations(
        &self,
        resource: &ProtectedResource,
    ) -> Result<Option<Vec<String>>, ProviderError> {
        let result = self
            .client(resource.scope)
            .get_logging_configuration()
            .resource_arn(&resource.arn)
            .send()
            .await;

        match result {
            Ok(resp) => Ok(resp
                .logging_configuration()
                .map(|c| c.log_destination_configs().to_vec())
                .filter(|arns| !arns.is_empty())),
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_waf_nonexistent_item_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(provider_error("GetLoggingConfiguration", e)),
        }
    }
}
