use std::fmt;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::StorageError;
use crate::model::{JobState, Stage};

/// Malformed or missing client input. Rejected before anything is written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Summary text is empty")]
    EmptySummary,

    #[error("Video upload is empty")]
    EmptyVideo,

    #[error("Unsupported video type '{0}'")]
    UnsupportedVideo(String),

    #[error("Segment '{segment_id}' does not belong to job '{job_id}'")]
    ForeignSegment { job_id: String, segment_id: String },

    #[error("Scene '{scene_id}' does not belong to job '{job_id}'")]
    ForeignScene { job_id: String, scene_id: String },

    #[error("Segment '{0}' is assigned to more than one scene in the same request")]
    AmbiguousEdit(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConflictError {
    #[error("Job '{job_id}' is busy with another request")]
    Busy { job_id: String },

    #[error("Cannot {operation} job '{job_id}' in state {state}")]
    InvalidState {
        job_id: String,
        operation: &'static str,
        state: JobState,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotFoundError {
    #[error("Job '{0}' not found")]
    Job(String),

    #[error("Artifact for job '{0}' not found")]
    Artifact(String),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Timed out waiting for job '{job_id}' (last state {state})")]
    Timeout { job_id: String, state: JobState },
}

/// A stage that could not complete, as recorded on the failed job.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: Stage,
    pub cause: String,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: impl fmt::Display) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.cause)
    }
}

impl std::error::Error for StageFailure {}
