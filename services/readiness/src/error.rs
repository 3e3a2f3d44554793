use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use assessment::{AssessmentError, JobStatus};
use blobstore::StoreError;

use crate::repo::RepoError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("upload exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("unsupported file type: {0}")]
    UnsupportedMediaType(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("dataset {0} not found")]
    DatasetNotFound(Uuid),

    #[error("assessment {0} not found")]
    JobNotFound(Uuid),

    #[error("assessment {job_id} is {status}; the report is not ready")]
    NotReady { job_id: Uuid, status: JobStatus },

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to store dataset file: {0}")]
    StorageWriteFailed(StoreError),

    #[error("object storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("failed to save dataset record: {0}")]
    PersistenceFailed(RepoError),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AssessmentError> for ServiceError {
    fn from(e: AssessmentError) -> Self {
        match e {
            AssessmentError::UnsupportedFormat(f) => ServiceError::UnsupportedFormat(f),
            AssessmentError::UnknownModule(_) | AssessmentError::InvalidModules(_) => {
                ServiceError::InvalidRequest(e.to_string())
            }
            AssessmentError::MetadataUnavailable(_) | AssessmentError::Render(_) => {
                ServiceError::Internal(e.to_string())
            }
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::InvalidRequest(_) | ServiceError::UnsupportedFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::DatasetNotFound(_) | ServiceError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::NotReady { .. } => StatusCode::CONFLICT,
            ServiceError::StorageWriteFailed(_)
            | ServiceError::Storage(_)
            | ServiceError::PersistenceFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Repository(RepoError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Repository(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::now_v7();
        assert_eq!(
            ServiceError::PayloadTooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServiceError::NotReady { job_id: id, status: JobStatus::InProgress }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ServiceError::JobNotFound(id).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::from(AssessmentError::UnsupportedFormat("pdf".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::StorageWriteFailed(StoreError::Unavailable("down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
