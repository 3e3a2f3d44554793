use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::state::SharedState;
use crate::types_datasets::Dataset;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    /// `(skip, limit)` with `limit` checked against 1..=100.
    pub fn window(&self) -> Result<(u64, u64), ServiceError> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ServiceError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok((self.skip.unwrap_or(0), limit))
    }
}

#[derive(Serialize)]
pub struct DatasetList {
    pub datasets: Vec<Dataset>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Multipart upload; the `file` field is streamed straight into ingestion.
pub async fn upload_dataset(
    State(state): State<SharedState>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<Dataset>), ServiceError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);

        let dataset = state
            .ingest
            .ingest(field, &filename, content_type.as_deref())
            .await?;
        return Ok((StatusCode::CREATED, Json(dataset)));
    }
    Err(ServiceError::InvalidRequest("missing multipart field `file`".into()))
}

pub async fn list_datasets(
    State(state): State<SharedState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<DatasetList>, ServiceError> {
    let (skip, limit) = q.window()?;
    let page = state.datasets.list(skip, limit).await?;
    Ok(Json(DatasetList {
        datasets: page.items,
        total: page.total,
        page: skip / limit + 1,
        page_size: limit,
    }))
}

pub async fn get_dataset(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Dataset>, ServiceError> {
    state
        .datasets
        .get(id)
        .await?
        .map(Json)
        .ok_or(ServiceError::DatasetNotFound(id))
}

pub async fn delete_dataset(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.ingest.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        let q = PageQuery { skip: None, limit: None };
        assert_eq!(q.window().unwrap(), (0, 10));
        let q = PageQuery { skip: Some(20), limit: Some(100) };
        assert_eq!(q.window().unwrap(), (20, 100));
        assert!(PageQuery { skip: None, limit: Some(0) }.window().is_err());
        assert!(PageQuery { skip: None, limit: Some(101) }.window().is_err());
    }
}
