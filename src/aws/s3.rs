use async_trait::async_trait;
use aws_sdk_s3::Client;
use futures::StreamExt;

use super::provider_error;
use crate::backend::{ObjectInfo, ObjectStore};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::sink::ByteStream;

/// Largest page ListObjectsV2 returns.
const MAX_KEYS: usize = 1000;

pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, ProviderError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| provider_error(&format!("ListObjectsV2 s3://{}/{}", bucket, prefix), e))?;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                });
            }

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(str::to_string);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(objects)
    }

    async fn sample(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ObjectInfo>, ProviderError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(limit.min(MAX_KEYS) as i32)
            .send()
            .await
            .map_err(|e| provider_error(&format!("ListObjectsV2 s3://{}/{}", bucket, prefix), e))?;

        Ok(resp
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, ProviderError> {
        let operation = format!("GetObject s3://{}/{}", bucket, key);
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| provider_error(&operation, e))?;

        let stream = futures::stream::try_unfold(resp.body, move |mut body| {
            let operation = operation.clone();
            async move {
                match body.try_next().await {
                    Ok(Some(chunk)) => Ok(Some((chunk, body))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(ProviderError::new(
                        operation,
                        ProviderErrorKind::Unreachable,
                        e.to_string(),
                    )),
                }
            }
        });
        Ok(stream.boxed())
    }
}
