use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::report::{overall_score, Report};
use crate::AssessmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Reserved; jobs are created `in_progress`.
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Quality,
    Accessibility,
}

pub const DEFAULT_MODULES: [ModuleKind; 2] = [ModuleKind::Quality, ModuleKind::Accessibility];

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Quality => "quality",
            ModuleKind::Accessibility => "accessibility",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ModuleKind::Quality),
            "accessibility" => Ok(ModuleKind::Accessibility),
            _ => Err(AssessmentError::UnknownModule(s.to_string())),
        }
    }
}

/// Resolve a requested module list; `None` means the default set.
pub fn parse_modules(requested: Option<&[String]>) -> crate::Result<Vec<ModuleKind>> {
    let Some(names) = requested else {
        return Ok(DEFAULT_MODULES.to_vec());
    };
    if names.is_empty() {
        return Err(AssessmentError::InvalidModules(
            "at least one module is required".to_string(),
        ));
    }
    let mut modules = Vec::with_capacity(names.len());
    for name in names {
        let kind: ModuleKind = name.parse()?;
        if modules.contains(&kind) {
            return Err(AssessmentError::InvalidModules(format!(
                "module {kind} listed more than once"
            )));
        }
        modules.push(kind);
    }
    Ok(modules)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: f64,
    pub current_module_index: usize,
    pub current_module: ModuleKind,
    pub modules_completed: usize,
    pub total_modules: usize,
}

impl Progress {
    fn at(modules: &[ModuleKind], completed: usize) -> Self {
        let total = modules.len();
        let index = completed.min(total.saturating_sub(1));
        Self {
            percentage: completed as f64 * 100.0 / total as f64,
            current_module_index: index,
            current_module: modules[index],
            modules_completed: completed,
            total_modules: total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub name: String,
    pub weight: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleScore {
    pub name: ModuleKind,
    /// 0..=10
    pub score: f64,
    #[serde(default)]
    pub criteria: Vec<CriterionScore>,
}

/// Events emitted by the job runner, applied in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssessmentEvent {
    ModuleStarted { index: usize },
    /// Every module except the last; the last one finishes with `Completed`.
    ModuleCompleted { index: usize },
    Completed { module_scores: Vec<ModuleScore>, report: Report },
    Failed { message: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("job {job_id} is already {status}")]
    Terminal { job_id: Uuid, status: JobStatus },

    #[error("invalid event for job {job_id}: {reason}")]
    InvalidEvent { job_id: Uuid, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentJob {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub status: JobStatus,
    pub modules: Vec<ModuleKind>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub module_scores: Option<Vec<ModuleScore>>,
    pub overall_score: Option<f64>,
    pub report: Option<Report>,
}

/// Status payload handed to pollers: the job without its report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub status: JobStatus,
    pub modules: Vec<ModuleKind>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub progress: Option<Progress>,
    pub error: Option<String>,
    pub module_scores: Option<Vec<ModuleScore>>,
    pub overall_score: Option<f64>,
}

impl AssessmentJob {
    /// New job, already running its first module at 0 %.
    ///
    /// `modules` must be non-empty; use [`parse_modules`] to build it.
    pub fn start(id: Uuid, dataset_id: Uuid, modules: Vec<ModuleKind>, now: DateTime<Utc>) -> Self {
        let progress = (!modules.is_empty()).then(|| Progress::at(&modules, 0));
        Self {
            id,
            dataset_id,
            status: JobStatus::InProgress,
            modules,
            started_at: now,
            updated_at: now,
            completed_at: None,
            duration_seconds: None,
            progress,
            error: None,
            module_scores: None,
            overall_score: None,
            report: None,
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            dataset_id: self.dataset_id,
            status: self.status,
            modules: self.modules.clone(),
            started_at: self.started_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            duration_seconds: self.duration_seconds,
            progress: self.progress.clone(),
            error: self.error.clone(),
            module_scores: self.module_scores.clone(),
            overall_score: self.overall_score,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> TransitionError {
        TransitionError::InvalidEvent {
            job_id: self.id,
            reason: reason.into(),
        }
    }

    fn modules_completed(&self) -> usize {
        self.progress.as_ref().map(|p| p.modules_completed).unwrap_or(0)
    }

    /// Apply `ev`. The job is left untouched when the event is rejected.
    pub fn apply_event(&mut self, ev: &AssessmentEvent, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                job_id: self.id,
                status: self.status,
            });
        }
        let total = self.modules.len();
        if total == 0 {
            return Err(self.invalid("job has no modules"));
        }

        match ev {
            AssessmentEvent::ModuleStarted { index } => {
                if *index != self.modules_completed() || *index >= total {
                    return Err(self.invalid(format!("module {index} cannot start now")));
                }
                self.status = JobStatus::InProgress;
                self.progress = Some(Progress::at(&self.modules, *index));
            }

            AssessmentEvent::ModuleCompleted { index } => {
                if *index != self.modules_completed() || *index + 1 >= total {
                    return Err(self.invalid(format!("module {index} cannot complete now")));
                }
                self.status = JobStatus::InProgress;
                self.progress = Some(Progress::at(&self.modules, index + 1));
            }

            AssessmentEvent::Completed { module_scores, report } => {
                let names: Vec<ModuleKind> = module_scores.iter().map(|s| s.name).collect();
                if names != self.modules {
                    return Err(self.invalid("module scores do not match the job's modules"));
                }
                if module_scores.iter().any(|s| !(0.0..=10.0).contains(&s.score)) {
                    return Err(self.invalid("module score outside 0..=10"));
                }
                self.status = JobStatus::Completed;
                self.progress = Some(Progress::at(&self.modules, total));
                self.overall_score = Some(overall_score(module_scores));
                self.module_scores = Some(module_scores.clone());
                self.report = Some(report.clone());
                self.error = None;
                self.finish(now);
            }

            AssessmentEvent::Failed { message } => {
                self.status = JobStatus::Failed;
                self.progress = None;
                self.module_scores = None;
                self.overall_score = None;
                self.report = None;
                self.error = Some(message.clone());
                self.finish(now);
            }
        }

        self.updated_at = now;
        Ok(())
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        let elapsed = now.signed_duration_since(self.started_at);
        self.duration_seconds = Some(elapsed.num_milliseconds().max(0) as f64 / 1000.0);
    }
}
