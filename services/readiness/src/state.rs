use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use blobstore::{FsObjectStore, InMemoryObjectStore, ObjectStore};

use crate::assessment_store::{AssessmentStore, InMemoryAssessmentStore, PgAssessmentStore};
use crate::config::{AppConfig, StorageBackend};
use crate::dataset_store::{DatasetStore, InMemoryDatasetStore, PgDatasetStore};
use crate::engine::AssessmentEngine;
use crate::ingest::{IngestLimits, IngestionPipeline};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub datasets: Arc<dyn DatasetStore>,
    pub assessments: Arc<dyn AssessmentStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub ingest: IngestionPipeline,
    pub engine: AssessmentEngine,
    pub pg_pool: Option<PgPool>,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Connect the configured backends. Postgres migrations run here.
    pub async fn from_config(cfg: AppConfig) -> Result<Self> {
        let (datasets, assessments, pg_pool) = match &cfg.database_url {
            Some(url) => {
                let pool = PgPool::connect(url)
                    .await
                    .context("Failed to connect to Postgres")?;
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run migrations")?;
                (
                    Arc::new(PgDatasetStore::new(pool.clone())) as Arc<dyn DatasetStore>,
                    Arc::new(PgAssessmentStore::new(pool.clone())) as Arc<dyn AssessmentStore>,
                    Some(pool),
                )
            }
            None => {
                info!("DATABASE_URL not set; records are kept in memory");
                (
                    Arc::new(InMemoryDatasetStore::new()) as Arc<dyn DatasetStore>,
                    Arc::new(InMemoryAssessmentStore::new()) as Arc<dyn AssessmentStore>,
                    None,
                )
            }
        };

        let objects = object_store(&cfg).await?;
        Ok(Self::assemble(cfg, datasets, assessments, objects, pg_pool))
    }

    #[cfg(test)]
    pub fn in_memory(cfg: AppConfig, objects: Arc<dyn ObjectStore>) -> Self {
        Self::assemble(
            cfg,
            Arc::new(InMemoryDatasetStore::new()),
            Arc::new(InMemoryAssessmentStore::new()),
            objects,
            None,
        )
    }

    fn assemble(
        config: AppConfig,
        datasets: Arc<dyn DatasetStore>,
        assessments: Arc<dyn AssessmentStore>,
        objects: Arc<dyn ObjectStore>,
        pg_pool: Option<PgPool>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let ingest = IngestionPipeline::new(
            objects.clone(),
            datasets.clone(),
            IngestLimits {
                max_bytes: config.max_upload_bytes,
                chunk_bytes: config.upload_chunk_bytes,
                temp_dir: config.temp_upload_dir.clone(),
            },
        );
        let engine = AssessmentEngine::new(
            datasets.clone(),
            assessments.clone(),
            Duration::from_millis(config.module_delay_ms),
            shutdown.clone(),
        );
        Self {
            config,
            datasets,
            assessments,
            objects,
            ingest,
            engine,
            pg_pool,
            started_at: Instant::now(),
            shutdown,
        }
    }
}

async fn object_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match cfg.storage_backend {
        StorageBackend::Memory => Arc::new(InMemoryObjectStore::new()),
        StorageBackend::Fs => Arc::new(FsObjectStore::new(&cfg.data_dir, &cfg.dataset_bucket)),
        StorageBackend::S3 => s3_store(cfg).await?,
    };
    Ok(store)
}

#[cfg(feature = "s3")]
async fn s3_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let s3 = cfg.s3.as_ref().context("S3 settings missing")?;
    let store = blobstore::S3ObjectStore::new(&blobstore::S3Config {
        endpoint: Some(s3.endpoint.clone()),
        region: s3.region.clone(),
        bucket: cfg.dataset_bucket.clone(),
        access_key: Some(s3.access_key.clone()),
        secret_key: Some(s3.secret_key.clone()),
        force_path_style: s3.force_path_style,
    })
    .await;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "s3"))]
async fn s3_store(_cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    anyhow::bail!("STORAGE_BACKEND=s3 requires building with the `s3` feature")
}
