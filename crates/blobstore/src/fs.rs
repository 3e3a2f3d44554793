use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::{validate_key, ObjectStore, Result, StoreError};

/// Objects as files under `<data_dir>/<container>/`.
///
/// Writes land in a `.partial` file first and are renamed into place, so a
/// reader never sees a half-written object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(data_dir: impl AsRef<Path>, container: &str) -> Self {
        Self {
            root: data_dir.as_ref().join(container),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn unavailable(op: &str, key: &str, e: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{op} {key}: {e}"))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn ensure_container_exists(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", self.root.display())))?;
        info!(root = %self.root.display(), "object container ready");
        Ok(())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let path = self.path_for(key)?;
        let tmp = self.root.join(format!("{key}.partial"));
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| unavailable("write", key, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(unavailable("rename", key, e));
        }
        debug!(key, bytes = data.len(), "[fs] put");
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(buf) => Ok(Bytes::from(buf)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(unavailable("read", key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable("delete", key, e)),
        }
    }
}
