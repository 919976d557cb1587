use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use montage::{OrchestratorError, StorageError};
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad Request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Orchestrator(e) => match e {
                OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
                OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
                OrchestratorError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Storage(e) => match e {
                StorageError::NotFound(_) | StorageError::InvalidHandle(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Multipart(e) => e.status(),
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Storage(StorageError::InvalidHandle(handle)) => {
                format!("Artifact not found: {}", handle)
            }
            ApiError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %message, "Request rejected");
        }

        (status, Json(ApiResponse::<()>::err(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage::{ConflictError, JobState, NotFoundError, ValidationError};

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                OrchestratorError::from(ValidationError::EmptySummary).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                OrchestratorError::from(NotFoundError::Job("j".into())).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                OrchestratorError::from(ConflictError::InvalidState {
                    job_id: "j".into(),
                    operation: "finalize",
                    state: JobState::Created,
                })
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                OrchestratorError::from(ConflictError::Busy { job_id: "j".into() }).into(),
                StatusCode::CONFLICT,
            ),
            (
                StorageError::InvalidHandle("../etc".into()).into(),
                StatusCode::NOT_FOUND,
            ),
            (StorageError::Exhausted(8).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::BadRequest("missing field".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{}", error);
        }
    }
}
