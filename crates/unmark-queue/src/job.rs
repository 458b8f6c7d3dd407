//! The queue payload for watermark-removal work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unmark_models::JobId;

/// Dispatch message telling a worker to process one job.
///
/// The payload carries only what the worker needs to load context; the
/// persisted job record remains the source of truth for lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveWatermarkJob {
    /// The persisted job this message dispatches
    pub job_id: JobId,
    /// Owning user
    pub owner_id: String,
    /// Storage location of the uploaded input
    pub input_location: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl RemoveWatermarkJob {
    /// Create a dispatch message for an existing job record.
    pub fn new(
        job_id: JobId,
        owner_id: impl Into<String>,
        input_location: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            owner_id: owner_id.into(),
            input_location: input_location.into(),
            created_at: Utc::now(),
        }
    }

    /// Idempotency key for deduplication. Keyed on the job ID alone:
    /// one live dispatch per job, however many times submission retries.
    pub fn idempotency_key(&self) -> String {
        format!("job:{}", self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_roundtrip() {
        let job = RemoveWatermarkJob::new(JobId::new(), "user_1", "uploads/user_1/in.mp4");

        let json = serde_json::to_string(&job).expect("serialize RemoveWatermarkJob");
        let decoded: RemoveWatermarkJob =
            serde_json::from_str(&json).expect("deserialize RemoveWatermarkJob");

        assert_eq!(decoded.job_id, job.job_id);
        assert_eq!(decoded.owner_id, job.owner_id);
        assert_eq!(decoded.input_location, job.input_location);
        assert_eq!(decoded.created_at, job.created_at);
    }

    #[test]
    fn test_idempotency_key_tracks_job_id() {
        let id = JobId::new();
        let a = RemoveWatermarkJob::new(id.clone(), "user_1", "uploads/a.mp4");
        let b = RemoveWatermarkJob::new(id, "user_1", "uploads/a.mp4");
        assert_eq!(a.idempotency_key(), b.idempotency_key());

        let other = RemoveWatermarkJob::new(JobId::new(), "user_1", "uploads/a.mp4");
        assert_ne!(a.idempotency_key(), other.idempotency_key());
    }
}
