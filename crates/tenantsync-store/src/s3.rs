//! S3-compatible object store using the AWS SDK.
//!
//! Works against Cloudflare R2, MinIO and AWS S3. Content hashes are the
//! object ETags with their surrounding quotes removed; conditional writes use
//! the native `If-Match` header, so a lost race surfaces as HTTP 412.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tenantsync_core::config::StoreConfig;
use tenantsync_core::domain::{is_placeholder, ObjectKey};
use tenantsync_core::ports::{IObjectStore, ObjectHead, ObjectInfo, StoreError};
use tracing::instrument;

/// Region used when the configuration leaves it empty
const DEFAULT_REGION: &str = "auto";

/// Strips the quotes S3 puts around ETags
fn normalize_etag(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}

fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
        .unwrap_or_default()
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

/// S3-compatible object store
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Builds a client from the `store` configuration section
    ///
    /// Explicit credentials are used when both halves are configured;
    /// otherwise the ambient AWS credential chain is consulted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if no bucket is configured or only one
    /// half of the credentials is set.
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| StoreError::Backend("s3 backend requires a bucket".to_string()))?;

        let region = if config.region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            config.region.clone()
        };

        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    key_id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "tenantsync-config",
                );
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(aws_config::Region::new(region))
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(aws_config::Region::new(region))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(StoreError::Backend(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ))
            }
        };

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let prefix = config
            .prefix
            .as_deref()
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
            prefix,
        })
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from a full object key.
    fn strip_prefix<'a>(&self, full_key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(full_key),
            None => full_key,
        }
    }

    fn map_sdk_error<E>(err: SdkError<E>, key: &str) -> StoreError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if status_of(&err) == Some(404) {
            return StoreError::NotFound(key.to_string());
        }
        StoreError::Backend(format!("{}", aws_sdk_s3::error::DisplayErrorContext(&err)))
    }

    async fn put_object(
        &self,
        key: &ObjectKey,
        data: Vec<u8>,
        if_match: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key.as_str()))
            .body(ByteStream::from(data));
        if let Some(expected) = if_match {
            request = request.if_match(format!("\"{expected}\""));
        }

        let output = request.send().await.map_err(|err| match if_match {
            // Some services answer a conditional write on a missing key with 404
            Some(expected) if matches!(status_of(&err), Some(412 | 404)) => {
                StoreError::PreconditionFailed {
                    key: key.to_string(),
                    expected: expected.to_string(),
                    actual: None,
                }
            }
            _ => Self::map_sdk_error(err, key.as_str()),
        })?;

        match output.e_tag() {
            Some(etag) => Ok(normalize_etag(etag)),
            None => Ok(self.head(key).await?.content_hash),
        }
    }
}

#[async_trait]
impl IObjectStore for S3ObjectStore {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let full_prefix = self.full_key(prefix);
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| Self::map_sdk_error(e, prefix))?;

            for obj in output.contents() {
                let Some(full_key) = obj.key() else {
                    continue;
                };
                let key = self.strip_prefix(full_key);
                if is_placeholder(key) {
                    continue;
                }
                results.push(ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: to_chrono(obj.last_modified()),
                    content_hash: obj.e_tag().map(normalize_etag).unwrap_or_default(),
                });
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key.as_str()))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key.as_str()))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(format!("failed to read body of {key}: {e}")))?
            .into_bytes();

        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &ObjectKey, data: Vec<u8>) -> Result<String, StoreError> {
        self.put_object(key, data, None).await
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put_if_match(
        &self,
        key: &ObjectKey,
        data: Vec<u8>,
        expected_hash: &str,
    ) -> Result<String, StoreError> {
        self.put_object(key, data, Some(expected_hash)).await
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &ObjectKey) -> Result<ObjectHead, StoreError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key.as_str()))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key.as_str()))?;

        Ok(ObjectHead {
            content_hash: output.e_tag().map(normalize_etag).unwrap_or_default(),
            last_modified: to_chrono(output.last_modified()),
            size: output.content_length().unwrap_or(0).max(0) as u64,
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn copy(&self, source: &ObjectKey, dest: &ObjectKey) -> Result<(), StoreError> {
        // CopySource is `bucket/key` with the key percent-encoded
        let encoded_key =
            utf8_percent_encode(&self.full_key(source.as_str()), NON_ALPHANUMERIC).to_string();
        let copy_source = format!("{}/{}", self.bucket, encoded_key);

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(self.full_key(dest.as_str()))
            .copy_source(&copy_source)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, source.as_str()))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store(prefix: Option<&str>) -> S3ObjectStore {
        let config = StoreConfig {
            backend: tenantsync_core::config::StoreBackend::S3,
            bucket: Some("tenants".into()),
            endpoint: Some("http://127.0.0.1:9".into()),
            access_key_id: Some("key".into()),
            secret_access_key: Some("secret".into()),
            force_path_style: true,
            prefix: prefix.map(Into::into),
            ..StoreConfig::default()
        };
        S3ObjectStore::from_config(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_key_and_strip_prefix() {
        let store = make_store(Some("/prod/")).await;
        assert_eq!(store.full_key("acme/a.db"), "prod/acme/a.db");
        assert_eq!(store.strip_prefix("prod/acme/a.db"), "acme/a.db");
        assert_eq!(store.strip_prefix("production/a.db"), "production/a.db");

        let bare = make_store(None).await;
        assert_eq!(bare.full_key("acme/a.db"), "acme/a.db");
    }

    #[tokio::test]
    async fn test_requires_complete_credentials() {
        let config = StoreConfig {
            bucket: Some("tenants".into()),
            access_key_id: Some("key".into()),
            ..StoreConfig::default()
        };
        assert!(matches!(
            S3ObjectStore::from_config(&config).await,
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn test_normalize_etag() {
        assert_eq!(normalize_etag("\"d41d8cd98f00b204e9800998ecf8427e\""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(normalize_etag("abc-2"), "abc-2");
    }
}
