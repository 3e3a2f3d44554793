use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use assessment::{
    build_report, parse_modules, render, AssessmentEvent, AssessmentJob, ExportFormat, JobStatus,
    JobView, ModuleKind, Report, ScoringInput,
};

use crate::assessment_store::AssessmentStore;
use crate::dataset_store::DatasetStore;
use crate::error::ServiceError;
use crate::repo::Page;
use crate::types_datasets::Dataset;

pub const RESTART_ERROR: &str = "service_restart";
pub const SHUTDOWN_ERROR: &str = "service_shutdown";

/// Runs assessment jobs. Each job gets one task that walks its modules in
/// order and reports progress to the store as events; readers only ever
/// see what the store holds.
#[derive(Clone)]
pub struct AssessmentEngine {
    datasets: Arc<dyn DatasetStore>,
    jobs: Arc<dyn AssessmentStore>,
    module_delay: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl AssessmentEngine {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        jobs: Arc<dyn AssessmentStore>,
        module_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            datasets,
            jobs,
            module_delay,
            shutdown,
            tracker: TaskTracker::new(),
        }
    }

    pub async fn trigger(
        &self,
        dataset_id: Uuid,
        modules: Option<Vec<String>>,
    ) -> Result<AssessmentJob, ServiceError> {
        let modules = parse_modules(modules.as_deref())?;
        if self.datasets.get(dataset_id).await?.is_none() {
            return Err(ServiceError::DatasetNotFound(dataset_id));
        }

        let job = AssessmentJob::start(Uuid::now_v7(), dataset_id, modules, Utc::now());
        self.jobs.insert(&job).await?;
        info!(job_id = %job.id, dataset_id = %dataset_id, modules = ?job.modules, "assessment started");

        let runner = self.clone();
        let (job_id, modules) = (job.id, job.modules.clone());
        self.tracker.spawn(async move {
            runner.run(job_id, dataset_id, modules).await;
        });

        Ok(job)
    }

    pub async fn status(&self, id: Uuid) -> Result<JobView, ServiceError> {
        Ok(self.get(id).await?.view())
    }

    pub async fn report(&self, id: Uuid) -> Result<Report, ServiceError> {
        let job = self.get(id).await?;
        match (job.status, job.report) {
            (JobStatus::Completed, Some(report)) => Ok(report),
            (JobStatus::Completed, None) => Err(ServiceError::Internal(format!(
                "assessment {id} completed without a report"
            ))),
            (status, _) => Err(ServiceError::NotReady { job_id: id, status }),
        }
    }

    /// The format is checked before the job is looked up.
    pub async fn export(&self, id: Uuid, format: &str) -> Result<(ExportFormat, Vec<u8>), ServiceError> {
        let format: ExportFormat = format.parse()?;
        let report = self.report(id).await?;
        Ok((format, render(&report, format)?))
    }

    pub async fn list(
        &self,
        dataset_id: Option<Uuid>,
        skip: u64,
        limit: u64,
    ) -> Result<Page<JobView>, ServiceError> {
        let page = self.jobs.list(dataset_id, skip, limit).await?;
        Ok(Page {
            items: page.items.iter().map(AssessmentJob::view).collect(),
            total: page.total,
        })
    }

    /// Fail every job a previous process left unfinished.
    pub async fn recover(&self) -> Result<usize, ServiceError> {
        let ids = self.jobs.list_unfinished().await?;
        let failed = AssessmentEvent::Failed {
            message: RESTART_ERROR.to_string(),
        };
        let mut recovered = 0;
        for id in ids {
            match self.jobs.apply(id, &failed, Utc::now()).await {
                Ok(_) => recovered += 1,
                Err(e) => warn!(job_id = %id, error = %e, "could not fail interrupted assessment"),
            }
        }
        if recovered > 0 {
            warn!(count = recovered, "failed assessments interrupted by a restart");
        }
        Ok(recovered)
    }

    /// Cancel running jobs and wait for their runners to record the outcome.
    pub async fn shutdown_and_wait(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn get(&self, id: Uuid) -> Result<AssessmentJob, ServiceError> {
        self.jobs.get(id).await?.ok_or(ServiceError::JobNotFound(id))
    }

    async fn run(&self, job_id: Uuid, dataset_id: Uuid, modules: Vec<ModuleKind>) {
        let event = match self.execute(job_id, dataset_id, &modules).await {
            Ok(done) => done,
            Err(message) => {
                warn!(job_id = %job_id, error = %message, "assessment failed");
                AssessmentEvent::Failed { message }
            }
        };
        match self.jobs.apply(job_id, &event, Utc::now()).await {
            Ok(job) => info!(
                job_id = %job_id,
                status = %job.status,
                overall_score = ?job.overall_score,
                "assessment finished"
            ),
            Err(e) => warn!(job_id = %job_id, error = %e, "could not record assessment outcome"),
        }
    }

    /// Score every module in order. Returns the terminal event to record.
    async fn execute(
        &self,
        job_id: Uuid,
        dataset_id: Uuid,
        modules: &[ModuleKind],
    ) -> Result<AssessmentEvent, String> {
        let mut outcomes = Vec::with_capacity(modules.len());
        let mut last: Option<Dataset> = None;

        for (index, kind) in modules.iter().enumerate() {
            self.pause().await?;
            self.step(job_id, AssessmentEvent::ModuleStarted { index }).await?;

            let dataset = self
                .datasets
                .get(dataset_id)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("dataset {dataset_id} no longer exists"))?;

            let outcome = assessment::run_module(*kind, &scoring_input(&dataset))
                .map_err(|e| format!("{kind} module failed: {e}"))?;
            debug!(job_id = %job_id, module = %kind, score = outcome.score.score, "module scored");
            outcomes.push(outcome);
            last = Some(dataset);

            if index + 1 < modules.len() {
                self.step(job_id, AssessmentEvent::ModuleCompleted { index }).await?;
            }
        }

        let dataset = last.ok_or_else(|| "assessment has no modules".to_string())?;
        let report = build_report(job_id, &scoring_input(&dataset), &outcomes, Utc::now());
        Ok(AssessmentEvent::Completed {
            module_scores: outcomes.into_iter().map(|o| o.score).collect(),
            report,
        })
    }

    async fn step(&self, job_id: Uuid, event: AssessmentEvent) -> Result<(), String> {
        self.jobs
            .apply(job_id, &event, Utc::now())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn pause(&self) -> Result<(), String> {
        if self.shutdown.is_cancelled() {
            return Err(SHUTDOWN_ERROR.to_string());
        }
        if self.module_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(SHUTDOWN_ERROR.to_string()),
            _ = tokio::time::sleep(self.module_delay) => Ok(()),
        }
    }
}

fn scoring_input(dataset: &Dataset) -> ScoringInput<'_> {
    ScoringInput {
        dataset_id: dataset.id,
        name: &dataset.name,
        file_size: dataset.file_size,
        metadata: &dataset.metadata,
    }
}
