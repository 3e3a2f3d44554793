use chrono::{DateTime, Utc};
use profiler::{FileKind, Metadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_NAME_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    /// Client supplied filename, reduced to its last path component.
    pub name: String,
    pub file_type: FileKind,
    pub file_size: u64,
    pub storage_key: String,
    /// BLAKE3 of the stored bytes, hex.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

pub fn sanitize_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    let name: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    if name.is_empty() {
        "dataset".to_string()
    } else {
        name
    }
}
