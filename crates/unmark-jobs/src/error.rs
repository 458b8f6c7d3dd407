//! Job store error types.

use thiserror::Error;
use unmark_models::JobStatus;

pub type JobStoreResult<T> = Result<T, JobStoreError>;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobStoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    pub fn invalid_transition(from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
}
