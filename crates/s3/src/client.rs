//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from s3tk-core.
//! The SDK's own retry layer is disabled; every request goes through
//! [`retry_with_backoff`] with the configured policy instead.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_smithy_types::retry::RetryConfig as SdkRetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;
use jiff::Timestamp;
use s3tk_core::{
    BatchDeleteResult, ClientConfig, DeleteFailure, Error, ListPage, ObjectInfo, ObjectMetadata,
    ObjectStore, Result, RetryConfig, is_retryable_error, retry_with_backoff,
};

const FALLBACK_REGION: &str = "us-east-1";

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    retry: RetryConfig,
}

impl S3Client {
    /// Create a new S3 client from the client configuration
    ///
    /// Unset values fall back to the standard AWS provider chain
    /// (environment, shared config files, instance metadata).
    pub async fn new(config: &ClientConfig) -> Result<Self> {
        let region = RegionProviderChain::first_try(config.region.clone().map(aws_config::Region::new))
            .or_default_provider()
            .or_else(aws_config::Region::new(FALLBACK_REGION));

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .timeout_config(timeouts)
            .retry_config(SdkRetryConfig::disabled());

        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = aws_credential_types::Credentials::new(
                    access_key,
                    secret_key,
                    None, // session token
                    None, // expiry
                    "s3tk-static-credentials",
                );
                loader = loader.credentials_provider(credentials);
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(
                    "access_key_id and secret_access_key must be set together".to_string(),
                ));
            }
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            path_style = config.force_path_style,
            max_attempts = config.retry.max_attempts,
            "S3 client ready"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            retry: config.retry.clone(),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

/// Translate an SDK error into the core error taxonomy
fn map_sdk_error<E>(error: &SdkError<E>, context: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match error {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let err = service.err();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(error).to_string());
            match (err.code(), status) {
                (Some("NoSuchKey" | "NoSuchBucket" | "NotFound"), _) | (None, 404) => {
                    Error::NotFound(context.to_string())
                }
                (Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _)
                | (None, 403) => Error::Auth(format!("{context}: {message}")),
                (Some(code), _) => Error::Service {
                    code: code.to_string(),
                    message,
                },
                (None, 429) => Error::Service {
                    code: "SlowDown".to_string(),
                    message,
                },
                (None, 500..) => Error::Service {
                    code: "ServiceUnavailable".to_string(),
                    message,
                },
                (None, _) => Error::General(format!("{context}: {message}")),
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            Error::Network(format!("{context}: {}", DisplayErrorContext(error)))
        }
        _ => Error::General(format!("{context}: {}", DisplayErrorContext(error))),
    }
}

fn to_timestamp(value: &aws_smithy_types::DateTime) -> Option<Timestamp> {
    Timestamp::new(value.secs(), value.subsec_nanos() as i32).ok()
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// `bucket/key` with every key segment percent-encoded
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
    format!("{bucket}/{}", encoded.join("/"))
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let context = format!("s3://{bucket}/{prefix}");
        let response = retry_with_backoff(
            &self.retry,
            || {
                let token = continuation_token.clone();
                let context = &context;
                async move {
                    let mut request = self.inner.list_objects_v2().bucket(bucket);
                    if !prefix.is_empty() {
                        request = request.prefix(prefix);
                    }
                    request
                        .set_continuation_token(token)
                        .send()
                        .await
                        .map_err(|e| map_sdk_error(&e, context))
                }
            },
            is_retryable_error,
        )
        .await?;

        let items = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectInfo {
                    key: key.to_string(),
                    size_bytes: object.size(),
                    etag: object.e_tag().map(trim_etag),
                    last_modified: object.last_modified().and_then(to_timestamp),
                })
            })
            .collect();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { items, next_token })
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<()> {
        let source = copy_source(source_bucket, source_key);
        let context = format!("s3://{source_bucket}/{source_key}");
        retry_with_backoff(
            &self.retry,
            || async {
                self.inner
                    .copy_object()
                    .copy_source(&source)
                    .bucket(destination_bucket)
                    .key(destination_key)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(&e, &context))
            },
            is_retryable_error,
        )
        .await?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let context = format!("s3://{bucket}/{key}");
        let response = retry_with_backoff(
            &self.retry,
            || async {
                self.inner
                    .head_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(&e, &context))
            },
            is_retryable_error,
        )
        .await?;

        Ok(ObjectMetadata {
            etag: response.e_tag().map(trim_etag),
            size_bytes: response.content_length(),
            last_modified: response.last_modified().and_then(to_timestamp),
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: Vec<String>) -> Result<BatchDeleteResult> {
        if keys.is_empty() {
            return Ok(BatchDeleteResult::default());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::General(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|e| Error::General(e.to_string()))?;

        let context = format!("s3://{bucket}");
        let response = retry_with_backoff(
            &self.retry,
            || async {
                self.inner
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete.clone())
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(&e, &context))
            },
            is_retryable_error,
        )
        .await?;

        let deleted = response
            .deleted()
            .iter()
            .filter_map(|d| d.key().map(str::to_string))
            .collect();
        let errors: Vec<DeleteFailure> = response
            .errors()
            .iter()
            .map(|e| DeleteFailure {
                key: e.key().unwrap_or_default().to_string(),
                code: e.code().map(str::to_string),
                message: e.message().unwrap_or_default().to_string(),
            })
            .collect();
        if !errors.is_empty() {
            tracing::warn!(bucket, failed = errors.len(), "Batch delete partially failed");
        }

        Ok(BatchDeleteResult { deleted, errors })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let context = format!("s3://{bucket}/{key}");
        retry_with_backoff(
            &self.retry,
            || async {
                let response = self
                    .inner
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(&e, &context))?;
                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| Error::Network(format!("{context}: {e}")))?;
                Ok::<_, Error>(data.into_bytes().to_vec())
            },
            is_retryable_error,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_encodes_segments() {
        assert_eq!(copy_source("bkt", "a/b.txt"), "bkt/a/b.txt");
        assert_eq!(
            copy_source("bkt", "dir with space/ü+1.jpg"),
            "bkt/dir%20with%20space/%C3%BC%2B1.jpg"
        );
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag("\"abc123\""), "abc123");
        assert_eq!(trim_etag("abc123"), "abc123");
    }

    #[test]
    fn test_to_timestamp() {
        let dt = aws_smithy_types::DateTime::from_secs(1_700_000_000);
        assert_eq!(to_timestamp(&dt).unwrap().as_second(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_rejects_half_static_credentials() {
        let config = ClientConfig {
            access_key_id: Some("key".to_string()),
            ..Default::default()
        };
        assert!(matches!(S3Client::new(&config).await, Err(Error::Config(_))));
    }
}
