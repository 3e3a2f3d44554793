//! Object store gateway
//!
//! Opaque byte blobs in a single container, addressed by generated keys.
//! Backends: in-memory (tests), local filesystem, and S3/MinIO behind the
//! `s3` feature. The gateway never retries; callers decide.

mod fs;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
#[cfg(feature = "s3")]
pub use s3::{S3Config, S3ObjectStore};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("object {0} not found")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Create the container if needed. Safe to call repeatedly.
    async fn ensure_container_exists(&self) -> Result<()>;

    /// Store `data` under `key`, returning the key.
    async fn put(&self, key: &str, data: Bytes) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Remove `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<T: ObjectStore> ObjectStore for Arc<T> {
    async fn ensure_container_exists(&self) -> Result<()> {
        (**self).ensure_container_exists().await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        (**self).put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}

/// Fresh storage key `{uuid}.{ext}`, unrelated to the uploaded filename.
pub fn generate_key(ext: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), ext)
}

/// Keys are flat names; anything that could escape the container is refused.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
