use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use super::{provider_error, CloudWatchLogsQuery, S3Store, WafLoggingConfig};
use crate::config::AwsConfig;
use crate::error::{ProviderError, ProviderErrorKind};

/// Loaded AWS configuration plus the caller's identity.
#[derive(Clone)]
pub struct AwsSession {
    sdk: SdkConfig,
    region: String,
    account_id: String,
    custom_endpoint: bool,
}

impl AwsSession {
    /// Load credentials the usual way (environment, profile, instance role),
    /// then confirm them by asking STS who we are.
    pub async fn connect(config: &AwsConfig) -> Result<Self, ProviderError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk = loader.load().await;

        let region = sdk.region().map(|r| r.to_string()).ok_or_else(|| {
            ProviderError::new(
                "load AWS config",
                ProviderErrorKind::Unreachable,
                "no region configured; set aws.region or AWS_REGION",
            )
        })?;

        let identity = aws_sdk_sts::Client::new(&sdk)
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| provider_error("GetCallerIdentity", e))?;
        let account_id = identity
            .account()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::malformed("GetCallerIdentity", "no account in response"))?;

        info!(account = %account_id, region = %region, "AWS session ready");
        Ok(Self {
            sdk,
            region,
            account_id,
            custom_endpoint: config.endpoint.is_some(),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn logging_config(&self) -> WafLoggingConfig {
        WafLoggingConfig::new(&self.sdk, &self.region)
    }

    /// Object store client for a bucket in `region`.
    pub fn object_store(&self, region: &str) -> S3Store {
        let config = aws_sdk_s3::config::Builder::from(&self.sdk)
            .region(Region::new(region.to_string()))
            .force_path_style(self.custom_endpoint)
            .build();
        S3Store::new(aws_sdk_s3::Client::from_conf(config))
    }

    /// Log query client for log groups in `region`.
    pub fn log_query(&self, region: &str) -> CloudWatchLogsQuery {
        let config = aws_sdk_cloudwatchlogs::config::Builder::from(&self.sdk)
            .region(Region::new(region.to_string()))
            .build();
        CloudWatchLogsQuery::new(aws_sdk_cloudwatchlogs::Client::from_conf(config))
    }
}
