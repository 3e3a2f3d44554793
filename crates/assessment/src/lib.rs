//! AI-readiness assessment
//!
//! Job record and its state machine, the scoring modules, and report
//! rendering. Everything here is pure; persistence and scheduling live in
//! the service.

mod export;
mod job;
mod report;
mod scoring;

pub use export::{render, ExportFormat};
pub use job::{
    parse_modules, AssessmentEvent, AssessmentJob, CriterionScore, JobStatus, JobView, ModuleKind,
    ModuleScore, Progress, TransitionError, DEFAULT_MODULES,
};
pub use report::{build_report, overall_score, Report};
pub use scoring::{run_module, ModuleOutcome, ScoringInput};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AssessmentError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown assessment module: {0}")]
    UnknownModule(String),

    #[error("invalid module list: {0}")]
    InvalidModules(String),

    #[error("dataset metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("failed to render report: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, AssessmentError>;
