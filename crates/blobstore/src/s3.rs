use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, info};

use crate::{validate_key, ObjectStore, Result, StoreError};

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// MinIO needs path-style addressing.
    pub force_path_style: bool,
}

/// S3 / MinIO backed object store; one bucket is the container.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

fn unavailable(op: &str, err: impl std::error::Error) -> StoreError {
    StoreError::Unavailable(format!("{op}: {}", DisplayErrorContext(err)))
}

impl S3ObjectStore {
    pub async fn new(config: &S3Config) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials =
                Credentials::new(access_key, secret_key, None, None, "StaticCredentialsProvider");
            loader = loader.credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(builder.build());

        info!(region = %config.region, bucket = %config.bucket, "S3 client configured");
        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_container_exists(&self) -> Result<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "created bucket");
                Ok(())
            }
            Err(e) => {
                let exists = e
                    .as_service_error()
                    .map(|se| se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists())
                    .unwrap_or(false);
                if exists {
                    Ok(())
                } else {
                    Err(unavailable("create bucket", e))
                }
            }
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        validate_key(key)?;
        let len = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| unavailable("put object", e))?;
        debug!(key, bytes = len, "[s3] put");
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    StoreError::NotFound(key.to_string())
                } else {
                    unavailable("get object", e)
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Unavailable(format!("read body of {key}: {e}")))?
            .into_bytes();
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 DeleteObject succeeds for absent keys
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| unavailable("delete object", e))?;
        Ok(())
    }
}
