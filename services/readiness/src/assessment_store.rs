use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::RwLock;
use uuid::Uuid;

use assessment::{AssessmentEvent, AssessmentJob, ModuleKind, ModuleScore, Progress, Report};

use crate::repo::{paginate, to_i64, Page, RepoError};

/// Assessment jobs. `apply` is the only way a stored job changes state and
/// is atomic per job: concurrent callers see each other's transitions.
#[async_trait]
pub trait AssessmentStore: Send + Sync + 'static {
    async fn insert(&self, job: &AssessmentJob) -> Result<(), RepoError>;
    async fn get(&self, id: Uuid) -> Result<Option<AssessmentJob>, RepoError>;
    /// Apply `event` to the stored job and return the updated job.
    async fn apply(
        &self,
        id: Uuid,
        event: &AssessmentEvent,
        now: DateTime<Utc>,
    ) -> Result<AssessmentJob, RepoError>;
    /// Newest first, optionally restricted to one dataset.
    async fn list(
        &self,
        dataset_id: Option<Uuid>,
        skip: u64,
        limit: u64,
    ) -> Result<Page<AssessmentJob>, RepoError>;
    /// Ids of jobs that have not reached a terminal state.
    async fn list_unfinished(&self) -> Result<Vec<Uuid>, RepoError>;
    async fn ping(&self) -> Result<(), RepoError>;
}

#[derive(Default)]
pub struct InMemoryAssessmentStore {
    jobs: RwLock<HashMap<Uuid, AssessmentJob>>,
}

impl InMemoryAssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssessmentStore for InMemoryAssessmentStore {
    async fn insert(&self, job: &AssessmentJob) -> Result<(), RepoError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AssessmentJob>, RepoError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn apply(
        &self,
        id: Uuid,
        event: &AssessmentEvent,
        now: DateTime<Utc>,
    ) -> Result<AssessmentJob, RepoError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        job.apply_event(event, now)?;
        Ok(job.clone())
    }

    async fn list(
        &self,
        dataset_id: Option<Uuid>,
        skip: u64,
        limit: u64,
    ) -> Result<Page<AssessmentJob>, RepoError> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<AssessmentJob> = jobs
            .values()
            .filter(|j| dataset_id.map_or(true, |d| j.dataset_id == d))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(paginate(&all, skip, limit))
    }

    async fn list_unfinished(&self) -> Result<Vec<Uuid>, RepoError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| !j.status.is_terminal())
            .map(|j| j.id)
            .collect())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct PgAssessmentStore {
    pool: PgPool,
}

impl PgAssessmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = "id, dataset_id, status, modules, started_at, updated_at, completed_at, \
     duration_seconds, progress, error, module_scores, overall_score, report";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    dataset_id: Uuid,
    status: String,
    modules: Json<Vec<ModuleKind>>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_seconds: Option<f64>,
    progress: Option<Json<Progress>>,
    error: Option<String>,
    module_scores: Option<Json<Vec<ModuleScore>>>,
    overall_score: Option<f64>,
    report: Option<Json<Report>>,
}

impl TryFrom<JobRow> for AssessmentJob {
    type Error = RepoError;

    fn try_from(r: JobRow) -> Result<Self, Self::Error> {
        Ok(AssessmentJob {
            id: r.id,
            dataset_id: r.dataset_id,
            status: r.status.parse().map_err(RepoError::Corrupt)?,
            modules: r.modules.0,
            started_at: r.started_at,
            updated_at: r.updated_at,
            completed_at: r.completed_at,
            duration_seconds: r.duration_seconds,
            progress: r.progress.map(|p| p.0),
            error: r.error,
            module_scores: r.module_scores.map(|s| s.0),
            overall_score: r.overall_score,
            report: r.report.map(|r| r.0),
        })
    }
}

async fn update_job(tx: &mut Transaction<'_, Postgres>, job: &AssessmentJob) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        UPDATE assessments
        SET status = $2,
            updated_at = $3,
            completed_at = $4,
            duration_seconds = $5,
            progress = $6,
            error = $7,
            module_scores = $8,
            overall_score = $9,
            report = $10
        WHERE id = $1
        "#,
    )
    .bind(job.id)
    .bind(job.status.as_str())
    .bind(job.updated_at)
    .bind(job.completed_at)
    .bind(job.duration_seconds)
    .bind(job.progress.as_ref().map(Json))
    .bind(&job.error)
    .bind(job.module_scores.as_ref().map(Json))
    .bind(job.overall_score)
    .bind(job.report.as_ref().map(Json))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl AssessmentStore for PgAssessmentStore {
    async fn insert(&self, job: &AssessmentJob) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO assessments (id, dataset_id, status, modules, started_at, updated_at,
                                     completed_at, duration_seconds, progress, error,
                                     module_scores, overall_score, report)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(job.dataset_id)
        .bind(job.status.as_str())
        .bind(Json(&job.modules))
        .bind(job.started_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .bind(job.duration_seconds)
        .bind(job.progress.as_ref().map(Json))
        .bind(&job.error)
        .bind(job.module_scores.as_ref().map(Json))
        .bind(job.overall_score)
        .bind(job.report.as_ref().map(Json))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AssessmentJob>, RepoError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM assessments WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(AssessmentJob::try_from).transpose()
    }

    async fn apply(
        &self,
        id: Uuid,
        event: &AssessmentEvent,
        now: DateTime<Utc>,
    ) -> Result<AssessmentJob, RepoError> {
        let mut tx: Transaction<Postgres> = self.pool.begin().await?;

        // row lock serializes transitions of the same job
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM assessments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut job = AssessmentJob::try_from(row.ok_or(RepoError::NotFound(id))?)?;
        job.apply_event(event, now)?;
        update_job(&mut tx, &job).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn list(
        &self,
        dataset_id: Option<Uuid>,
        skip: u64,
        limit: u64,
    ) -> Result<Page<AssessmentJob>, RepoError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM assessments
            WHERE ($1::uuid IS NULL OR dataset_id = $1)
            ORDER BY started_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#
        ))
        .bind(dataset_id)
        .bind(to_i64(skip))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM assessments WHERE ($1::uuid IS NULL OR dataset_id = $1)",
        )
        .bind(dataset_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(AssessmentJob::try_from)
                .collect::<Result<_, _>>()?,
            total: total.max(0) as u64,
        })
    }

    async fn list_unfinished(&self) -> Result<Vec<Uuid>, RepoError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM assessments WHERE status IN ('pending', 'in_progress')",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessment::{JobStatus, TransitionError, DEFAULT_MODULES};
    use chrono::Duration;
    use std::sync::Arc;

    fn job(dataset_id: Uuid, started_at: DateTime<Utc>) -> AssessmentJob {
        AssessmentJob::start(Uuid::now_v7(), dataset_id, DEFAULT_MODULES.to_vec(), started_at)
    }

    #[tokio::test]
    async fn test_apply_rejects_second_terminal_transition() {
        let store = InMemoryAssessmentStore::new();
        let j = job(Uuid::now_v7(), Utc::now());
        store.insert(&j).await.unwrap();

        let failed = store
            .apply(j.id, &AssessmentEvent::Failed { message: "first".into() }, Utc::now())
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);

        let err = store
            .apply(j.id, &AssessmentEvent::Failed { message: "second".into() }, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Transition(TransitionError::Terminal { .. })
        ));
        let stored = store.get(j.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_concurrent_terminal_transitions_only_one_wins() {
        let store = Arc::new(InMemoryAssessmentStore::new());
        let j = job(Uuid::now_v7(), Utc::now());
        store.insert(&j).await.unwrap();

        let id = j.id;
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let ev = AssessmentEvent::Failed { message: format!("worker {i}") };
                store.apply(id, &ev, Utc::now()).await.is_ok()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = InMemoryAssessmentStore::new();
        let ds_a = Uuid::now_v7();
        let ds_b = Uuid::now_v7();
        let t0 = Utc::now();
        let a1 = job(ds_a, t0);
        let a2 = job(ds_a, t0 + Duration::seconds(5));
        let b1 = job(ds_b, t0 + Duration::seconds(1));
        for j in [&a1, &a2, &b1] {
            store.insert(j).await.unwrap();
        }

        let page = store.list(Some(ds_a), 0, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, a2.id);
        assert_eq!(page.items[1].id, a1.id);

        let all = store.list(None, 0, 10).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.items[1].id, b1.id);
    }

    #[tokio::test]
    async fn test_apply_unknown_job() {
        let store = InMemoryAssessmentStore::new();
        let id = Uuid::now_v7();
        let err = store
            .apply(id, &AssessmentEvent::ModuleStarted { index: 0 }, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound(x) if x == id));
    }
}
