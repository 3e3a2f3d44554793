use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use blobstore::{generate_key, ObjectStore};
use profiler::{FileKind, Metadata};

use crate::dataset_store::DatasetStore;
use crate::error::ServiceError;
use crate::types_datasets::{sanitize_name, Dataset};

#[derive(Clone, Debug)]
pub struct IngestLimits {
    pub max_bytes: u64,
    pub chunk_bytes: usize,
    pub temp_dir: PathBuf,
}

/// Upload → temp sink → type resolution → profile → object store → record.
#[derive(Clone)]
pub struct IngestionPipeline {
    objects: Arc<dyn ObjectStore>,
    datasets: Arc<dyn DatasetStore>,
    limits: IngestLimits,
}

impl IngestionPipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        datasets: Arc<dyn DatasetStore>,
        limits: IngestLimits,
    ) -> Self {
        Self {
            objects,
            datasets,
            limits,
        }
    }

    pub async fn ingest<S, E>(
        &self,
        stream: S,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<Dataset, ServiceError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let name = sanitize_name(filename);

        // The temp file is removed when `sink` drops, whichever way we leave.
        let (sink, size) = self.buffer_upload(stream).await?;

        let kind = resolve_file_kind(&name, content_type).ok_or_else(|| {
            ServiceError::UnsupportedMediaType(format!(
                "{name} ({})",
                content_type.unwrap_or("no content type")
            ))
        })?;

        let data = Bytes::from(
            tokio::fs::read(&sink)
                .await
                .map_err(|e| ServiceError::Internal(format!("read temp upload: {e}")))?,
        );
        drop(sink);

        let content_hash = hex::encode(blake3::hash(&data).as_bytes());
        let metadata = profile_blocking(data.clone(), kind).await;
        if metadata.is_failed() {
            warn!(
                file = %name,
                error = metadata.error.as_deref().unwrap_or(""),
                "profiling failed; storing dataset with degraded metadata"
            );
        }

        let storage_key = self
            .objects
            .put(&generate_key(kind.extension()), data)
            .await
            .map_err(ServiceError::StorageWriteFailed)?;

        let dataset = Dataset {
            id: Uuid::now_v7(),
            name,
            file_type: kind,
            file_size: size,
            storage_key,
            content_hash,
            created_at: Utc::now(),
            metadata,
        };

        if let Err(e) = self.datasets.insert(&dataset).await {
            match self.objects.delete(&dataset.storage_key).await {
                Ok(()) => warn!(key = %dataset.storage_key, "record insert failed; removed uploaded object"),
                Err(del) => error!(
                    key = %dataset.storage_key,
                    error = %del,
                    "record insert failed and uploaded object could not be removed"
                ),
            }
            return Err(ServiceError::PersistenceFailed(e));
        }

        info!(
            dataset_id = %dataset.id,
            key = %dataset.storage_key,
            file_type = %kind,
            bytes = size,
            "dataset ingested"
        );
        Ok(dataset)
    }

    /// Remove the stored object, then the record.
    pub async fn remove(&self, id: Uuid) -> Result<(), ServiceError> {
        let dataset = self
            .datasets
            .get(id)
            .await?
            .ok_or(ServiceError::DatasetNotFound(id))?;

        if let Err(e) = self.objects.delete(&dataset.storage_key).await {
            error!(dataset_id = %id, key = %dataset.storage_key, error = %e, "dataset object delete failed; record kept");
            return Err(e.into());
        }

        match self.datasets.delete(id).await {
            Ok(true) => {
                info!(dataset_id = %id, "dataset deleted");
                Ok(())
            }
            Ok(false) => Err(ServiceError::DatasetNotFound(id)),
            Err(e) => {
                error!(dataset_id = %id, error = %e, "object removed but dataset record remains");
                Err(e.into())
            }
        }
    }

    async fn buffer_upload<S, E>(&self, stream: S) -> Result<(tempfile::TempPath, u64), ServiceError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let io = |e: std::io::Error| ServiceError::Internal(format!("temp upload: {e}"));

        tokio::fs::create_dir_all(&self.limits.temp_dir).await.map_err(io)?;
        let dir = self.limits.temp_dir.clone();
        let tmp = tokio::task::spawn_blocking(move || tempfile::NamedTempFile::new_in(dir))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(io)?;
        let (file, path) = tmp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        tokio::pin!(stream);
        let chunk = self.limits.chunk_bytes.max(1);
        let mut pending = BytesMut::with_capacity(chunk);
        let mut received: u64 = 0;

        while let Some(next) = stream.next().await {
            let bytes = next.map_err(|e| ServiceError::InvalidRequest(format!("upload stream: {e}")))?;
            received += bytes.len() as u64;
            if received > self.limits.max_bytes {
                return Err(ServiceError::PayloadTooLarge {
                    limit: self.limits.max_bytes,
                });
            }
            pending.extend_from_slice(&bytes);
            while pending.len() >= chunk {
                let piece = pending.split_to(chunk);
                file.write_all(&piece).await.map_err(io)?;
            }
        }
        if !pending.is_empty() {
            file.write_all(&pending).await.map_err(io)?;
        }
        file.flush().await.map_err(io)?;

        Ok((path, received))
    }
}

/// Extension first, then the declared content type.
pub fn resolve_file_kind(filename: &str, content_type: Option<&str>) -> Option<FileKind> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(FileKind::from_extension)
        .or_else(|| content_type.and_then(FileKind::from_content_type))
}

async fn profile_blocking(data: Bytes, kind: FileKind) -> Metadata {
    match tokio::task::spawn_blocking(move || profiler::profile(&data, kind)).await {
        Ok(m) => m,
        Err(e) => Metadata::failed(kind, format!("profiler task failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobstore::InMemoryObjectStore;
    use profiler::ProcessingStatus;

    use crate::dataset_store::InMemoryDatasetStore;

    struct Fixture {
        objects: InMemoryObjectStore,
        datasets: Arc<InMemoryDatasetStore>,
        pipeline: IngestionPipeline,
        _dir: tempfile::TempDir,
        temp_dir: PathBuf,
    }

    fn fixture(max_bytes: u64, chunk_bytes: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let temp_dir = dir.path().join("uploads");
        let objects = InMemoryObjectStore::new();
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let pipeline = IngestionPipeline::new(
            Arc::new(objects.clone()),
            datasets.clone(),
            IngestLimits {
                max_bytes,
                chunk_bytes,
                temp_dir: temp_dir.clone(),
            },
        );
        Fixture {
            objects,
            datasets,
            pipeline,
            _dir: dir,
            temp_dir,
        }
    }

    fn body(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        let parts: Vec<Result<Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        futures::stream::iter(parts)
    }

    fn temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    const CSV: &[u8] = b"id,name\n1,a\n2,b\n";

    #[tokio::test]
    async fn test_ingest_csv_in_small_chunks() {
        let fx = fixture(1024, 4);
        let ds = fx
            .pipeline
            .ingest(body(&[&CSV[..5], &CSV[5..]]), "people.csv", None)
            .await
            .unwrap();

        assert_eq!(ds.file_type, FileKind::Csv);
        assert_eq!(ds.file_size, CSV.len() as u64);
        assert_eq!(ds.metadata.row_count, 2);
        assert_eq!(ds.content_hash, blake3::hash(CSV).to_hex().to_string());
        assert_eq!(fx.objects.get(&ds.storage_key).await.unwrap(), Bytes::from_static(CSV));
        assert!(fx.datasets.get(ds.id).await.unwrap().is_some());
        assert_eq!(temp_files(&fx.temp_dir), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_writes_nothing() {
        let fx = fixture(10, 4);
        let err = fx
            .pipeline
            .ingest(body(&[&b"12345678"[..], &b"12345678"[..]]), "big.csv", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::PayloadTooLarge { limit: 10 }));
        assert_eq!(fx.objects.put_count(), 0);
        assert_eq!(fx.datasets.list(0, 10).await.unwrap().total, 0);
        assert_eq!(temp_files(&fx.temp_dir), 0);
    }

    #[tokio::test]
    async fn test_unsupported_type_is_rejected() {
        let fx = fixture(1024, 1024);
        let err = fx
            .pipeline
            .ingest(body(&[&b"\x89PNG"[..]]), "logo.png", Some("image/png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::UnsupportedMediaType(_)));
        assert_eq!(fx.objects.put_count(), 0);
        assert_eq!(temp_files(&fx.temp_dir), 0);
    }

    #[tokio::test]
    async fn test_content_type_fallback() {
        let fx = fixture(1024, 1024);
        let ds = fx
            .pipeline
            .ingest(body(&[&b"[1, 2, 3]"[..]]), "upload", Some("application/json; charset=utf-8"))
            .await
            .unwrap();
        assert_eq!(ds.file_type, FileKind::Json);
        assert!(ds.storage_key.ends_with(".json"));
    }

    #[tokio::test]
    async fn test_profiler_failure_still_creates_dataset() {
        let fx = fixture(1024, 1024);
        let ds = fx
            .pipeline
            .ingest(body(&[&b"{not json"[..]]), "broken.json", None)
            .await
            .unwrap();

        assert_eq!(ds.metadata.processing_status, ProcessingStatus::Failed);
        assert!(ds.metadata.error.is_some());
        assert_eq!(fx.objects.put_count(), 1);
        assert!(fx.datasets.get(ds.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_no_record() {
        let fx = fixture(1024, 1024);
        fx.objects.fake_fail_writes(true);
        let err = fx.pipeline.ingest(body(&[CSV]), "a.csv", None).await.unwrap_err();

        assert!(matches!(err, ServiceError::StorageWriteFailed(_)));
        assert_eq!(fx.datasets.list(0, 10).await.unwrap().total, 0);
        assert_eq!(temp_files(&fx.temp_dir), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_removes_uploaded_object() {
        let fx = fixture(1024, 1024);
        fx.datasets.fake_fail_writes(true);
        let err = fx.pipeline.ingest(body(&[CSV]), "a.csv", None).await.unwrap_err();

        assert!(matches!(err, ServiceError::PersistenceFailed(_)));
        assert_eq!(fx.objects.put_count(), 1);
        assert_eq!(fx.objects.len().await, 0);
    }

    #[tokio::test]
    async fn test_stream_error_is_invalid_request() {
        let fx = fixture(1024, 1024);
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"a,b\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let err = fx
            .pipeline
            .ingest(futures::stream::iter(parts), "a.csv", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
        assert_eq!(temp_files(&fx.temp_dir), 0);
    }

    #[tokio::test]
    async fn test_remove_deletes_object_and_record() {
        let fx = fixture(1024, 1024);
        let ds = fx.pipeline.ingest(body(&[CSV]), "a.csv", None).await.unwrap();

        fx.pipeline.remove(ds.id).await.unwrap();
        assert!(!fx.objects.contains(&ds.storage_key).await);
        assert!(fx.datasets.get(ds.id).await.unwrap().is_none());
        assert_eq!(fx.datasets.list(0, 10).await.unwrap().total, 0);

        let err = fx.pipeline.remove(ds.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::DatasetNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_keeps_record_when_object_delete_fails() {
        let fx = fixture(1024, 1024);
        let ds = fx.pipeline.ingest(body(&[CSV]), "a.csv", None).await.unwrap();
        fx.objects.fake_fail_deletes(true);

        let err = fx.pipeline.remove(ds.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
        assert!(fx.datasets.get(ds.id).await.unwrap().is_some());
    }

    #[test]
    fn test_resolve_file_kind() {
        assert_eq!(resolve_file_kind("a.CSV", None), Some(FileKind::Csv));
        assert_eq!(resolve_file_kind("notes.txt", Some("application/json")), Some(FileKind::Text));
        assert_eq!(resolve_file_kind("blob", Some("text/plain")), Some(FileKind::Text));
        assert_eq!(resolve_file_kind("blob", None), None);
    }
}
