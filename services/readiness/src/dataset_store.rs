use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use profiler::Metadata;

use crate::repo::{paginate, to_i64, Page, RepoError};
use crate::types_datasets::Dataset;

/// Dataset records, newest first.
#[async_trait]
pub trait DatasetStore: Send + Sync + 'static {
    async fn insert(&self, dataset: &Dataset) -> Result<(), RepoError>;
    async fn get(&self, id: Uuid) -> Result<Option<Dataset>, RepoError>;
    /// Ordered by `created_at` descending, ties by id descending.
    async fn list(&self, skip: u64, limit: u64) -> Result<Page<Dataset>, RepoError>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, RepoError>;
    async fn ping(&self) -> Result<(), RepoError>;
}

#[derive(Default)]
pub struct InMemoryDatasetStore {
    rows: RwLock<HashMap<Uuid, Dataset>>,
    fail_writes: AtomicBool,
}

impl InMemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn fake_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatasetStore for InMemoryDatasetStore {
    async fn insert(&self, dataset: &Dataset) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("simulated write failure".into()));
        }
        self.rows.write().await.insert(dataset.id, dataset.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Dataset>, RepoError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list(&self, skip: u64, limit: u64) -> Result<Page<Dataset>, RepoError> {
        let rows = self.rows.read().await;
        let mut all: Vec<Dataset> = rows.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(&all, skip, limit))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("simulated write failure".into()));
        }
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct PgDatasetStore {
    pool: PgPool,
}

impl PgDatasetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DatasetRow {
    id: Uuid,
    name: String,
    file_type: String,
    file_size: i64,
    storage_key: String,
    content_hash: String,
    created_at: DateTime<Utc>,
    metadata: Json<Metadata>,
}

impl TryFrom<DatasetRow> for Dataset {
    type Error = RepoError;

    fn try_from(r: DatasetRow) -> Result<Self, Self::Error> {
        Ok(Dataset {
            id: r.id,
            name: r.name,
            file_type: r.file_type.parse().map_err(RepoError::Corrupt)?,
            file_size: u64::try_from(r.file_size)
                .map_err(|_| RepoError::Corrupt(format!("negative file_size for {}", r.id)))?,
            storage_key: r.storage_key,
            content_hash: r.content_hash,
            created_at: r.created_at,
            metadata: r.metadata.0,
        })
    }
}

#[async_trait]
impl DatasetStore for PgDatasetStore {
    async fn insert(&self, d: &Dataset) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO datasets (id, name, file_type, file_size, storage_key, content_hash, created_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(d.id)
        .bind(&d.name)
        .bind(d.file_type.as_str())
        .bind(to_i64(d.file_size))
        .bind(&d.storage_key)
        .bind(&d.content_hash)
        .bind(d.created_at)
        .bind(Json(&d.metadata))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Dataset>, RepoError> {
        let row: Option<DatasetRow> = sqlx::query_as(
            r#"
            SELECT id, name, file_type, file_size, storage_key, content_hash, created_at, metadata
            FROM datasets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Dataset::try_from).transpose()
    }

    async fn list(&self, skip: u64, limit: u64) -> Result<Page<Dataset>, RepoError> {
        let rows: Vec<DatasetRow> = sqlx::query_as(
            r#"
            SELECT id, name, file_type, file_size, storage_key, content_hash, created_at, metadata
            FROM datasets
            ORDER BY created_at DESC, id DESC
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(to_i64(skip))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM datasets")
            .fetch_one(&self.pool)
            .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(Dataset::try_from)
                .collect::<Result<_, _>>()?,
            total: total.max(0) as u64,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        let res = sqlx::query("DELETE FROM datasets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
