use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of file kinds the profiler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Json,
    Text,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Json => "json",
            FileKind::Text => "text",
        }
    }

    /// Extension used when the file is written to storage.
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Json => "json",
            FileKind::Text => "txt",
        }
    }

    /// Exact, case-insensitive match against the extension table.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileKind::Csv),
            "json" => Some(FileKind::Json),
            "txt" => Some(FileKind::Text),
            _ => None,
        }
    }

    /// Match a declared MIME type (parameters such as `charset` are ignored).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "application/csv" | "application/vnd.ms-excel" => Some(FileKind::Csv),
            "application/json" => Some(FileKind::Json),
            "text/plain" => Some(FileKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(FileKind::Csv),
            "json" => Ok(FileKind::Json),
            "text" => Ok(FileKind::Text),
            other => Err(format!("unknown file kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Completed,
    Failed,
}

/// Shape the profiler recognised in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Structure {
    Table,
    ArrayOfObjects,
    ArrayOfValues,
    Object,
    Value,
    Lines,
}

/// Inferred type of a column (or of a lone JSON value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Integer,
    Float,
    String,
    Boolean,
    Null,
    Array,
    Object,
    /// Column without a single non-null value.
    Empty,
    Unknown,
}

impl DataType {
    pub fn of_value(v: &Value) -> Self {
        match v {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Integer,
            Value::Number(_) => DataType::Float,
            Value::String(_) => DataType::String,
            Value::Array(_) => DataType::Array,
            Value::Object(_) => DataType::Object,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float | DataType::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub null_count: usize,
    pub null_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub unique_count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    /// At most ten entries, most frequent first.
    pub top_values: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

impl ColumnStats {
    pub fn null_count(&self) -> usize {
        match self {
            ColumnStats::Numeric(s) => s.null_count,
            ColumnStats::Categorical(s) => s.null_count,
        }
    }

    pub fn null_percentage(&self) -> f64 {
        match self {
            ColumnStats::Numeric(s) => s.null_percentage,
            ColumnStats::Categorical(s) => s.null_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    pub overall_missing_percentage: f64,
    pub columns_with_nulls: usize,
    pub rows_with_nulls: usize,
}

/// Distribution summary; every field is 0 for an empty input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub estimated_total: usize,
    pub estimation_method: String,
    /// Non-whitespace characters the estimate is based on.
    pub characters: usize,
}

/// Profiling output attached to a dataset.
///
/// A flat document: fields that do not apply to a given shape are omitted
/// when serialized and default when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub format: FileKind,
    pub processing_status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Structure>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub column_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_types: BTreeMap<String, DataType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_data: Vec<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statistics: BTreeMap<String, ColumnStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<Completeness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_length_stats: Option<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<TokenEstimate>,
}

impl Metadata {
    /// Empty, successful document for `format`; profilers fill in the rest.
    pub fn completed(format: FileKind, structure: Structure) -> Self {
        Self {
            format,
            processing_status: ProcessingStatus::Completed,
            error: None,
            structure: Some(structure),
            row_count: 0,
            column_count: 0,
            columns: Vec::new(),
            data_types: BTreeMap::new(),
            sample_data: Vec::new(),
            statistics: BTreeMap::new(),
            completeness: None,
            duplicate_rows: None,
            delimiter: None,
            has_header: None,
            item_count: None,
            key_count: None,
            line_length_stats: None,
            estimated_tokens: None,
        }
    }

    /// Degraded document recorded when the content could not be profiled.
    pub fn failed(format: FileKind, error: impl Into<String>) -> Self {
        let mut m = Self::completed(format, Structure::Value);
        m.processing_status = ProcessingStatus::Failed;
        m.structure = None;
        m.error = Some(error.into());
        m
    }

    pub fn is_failed(&self) -> bool {
        self.processing_status == ProcessingStatus::Failed
    }
}
