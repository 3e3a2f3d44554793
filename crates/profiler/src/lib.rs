//! Dataset profiler
//!
//! Turns raw file bytes plus a declared kind into structured metadata:
//! schema, per-column statistics, completeness and a few sample records.
//! Profiling never fails outright; unparseable input yields metadata with
//! `processing_status: failed` and the parse error.

mod json;
mod stats;
mod table;
mod text;
mod types;

pub use types::{
    CategoricalStats, ColumnStats, Completeness, DataType, FileKind, Metadata, NumericStats,
    ProcessingStatus, Structure, Summary, TokenEstimate, ValueCount,
};

use thiserror::Error;

/// Number of records copied into `sample_data`.
pub const SAMPLE_ROWS: usize = 5;

/// Number of most frequent values kept per categorical column.
pub const TOP_VALUES: usize = 10;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("text is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

/// Profile `bytes` as `kind`.
pub fn profile(bytes: &[u8], kind: FileKind) -> Metadata {
    let result = match kind {
        FileKind::Csv => table::profile_csv(bytes),
        FileKind::Json => json::profile_json(bytes),
        FileKind::Text => text::profile_text(bytes),
    };
    result.unwrap_or_else(|e| Metadata::failed(kind, e.to_string()))
}
