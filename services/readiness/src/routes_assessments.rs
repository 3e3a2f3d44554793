use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use assessment::{JobStatus, JobView, ModuleKind, Report};

use crate::error::ServiceError;
use crate::routes_datasets::PageQuery;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub dataset_id: Uuid,
    pub modules: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub assessment_id: Uuid,
    pub status: JobStatus,
    pub modules: Vec<ModuleKind>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub dataset_id: Option<Uuid>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Serialize)]
pub struct AssessmentList {
    pub assessments: Vec<JobView>,
    pub total: u64,
}

pub async fn trigger_assessment(
    State(state): State<SharedState>,
    Json(req): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), ServiceError> {
    let job = state.engine.trigger(req.dataset_id, req.modules).await?;
    Ok((
        StatusCode::CREATED,
        Json(TriggerResponse {
            assessment_id: job.id,
            status: job.status,
            modules: job.modules,
        }),
    ))
}

pub async fn get_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ServiceError> {
    Ok(Json(state.engine.status(id).await?))
}

pub async fn get_report(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Report>, ServiceError> {
    Ok(Json(state.engine.report(id).await?))
}

pub async fn export_report(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ExportQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (format, body) = state
        .engine
        .export(id, q.format.as_deref().unwrap_or("json"))
        .await?;
    let disposition = format!(
        "attachment; filename=\"assessment-{id}.{}\"",
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

pub async fn list_assessments(
    State(state): State<SharedState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<AssessmentList>, ServiceError> {
    let (skip, limit) = PageQuery {
        skip: q.skip,
        limit: q.limit,
    }
    .window()?;
    let page = state.engine.list(q.dataset_id, skip, limit).await?;
    Ok(Json(AssessmentList {
        assessments: page.items,
        total: page.total,
    }))
}
