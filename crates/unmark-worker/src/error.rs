//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] unmark_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] unmark_media::MediaError),

    #[error("Job store error: {0}")]
    JobStore(#[from] unmark_jobs::JobStoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] unmark_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl WorkerError {
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }
}
