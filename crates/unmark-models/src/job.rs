//! The persisted watermark-removal job record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// Transitions are one-directional: `Pending -> Processing -> {Completed, Failed}`.
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker
    #[default]
    Pending,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully; output location is set
    Completed,
    /// Job failed; error message is set
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse from the string form produced by [`JobStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted watermark-removal request and its outcome.
///
/// Created in `Pending` by the submission path; mutated by exactly one
/// worker invocation over its lifetime. The invariants a reader may rely
/// on: `output_location` is set iff `Completed`, `error_message` is set
/// iff `Failed`, and both processing timestamps are set in any terminal
/// state with start <= end.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning user (opaque to the pipeline)
    pub owner_id: String,

    /// Storage location of the uploaded input video
    pub input_location: String,

    /// Storage location of the processed output (set on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Error message (set on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When a worker picked the job up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(owner_id: impl Into<String>, input_location: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            input_location: input_location.into(),
            output_location: None,
            status: JobStatus::Pending,
            error_message: None,
            progress: 0,
            created_at: Utc::now(),
            processing_started_at: None,
            processing_completed_at: None,
        }
    }

    /// Start processing the job.
    pub fn start(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.processing_started_at = Some(Utc::now());
        self
    }

    /// Mark job as completed, recording the output location.
    pub fn complete(mut self, output_location: impl Into<String>) -> Self {
        self.status = JobStatus::Completed;
        self.output_location = Some(output_location.into());
        self.error_message = None;
        self.progress = 100;
        self.processing_completed_at = Some(Utc::now());
        self
    }

    /// Mark job as failed with a human-readable cause.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.processing_completed_at = Some(Utc::now());
        self
    }

    /// Update progress, clamped to 0-100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = Job::new("user123", "uploads/user123/video.mp4");

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.output_location.is_none());
        assert!(job.error_message.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_job_complete_transition() {
        let job = Job::new("user123", "uploads/in.mp4").start();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.processing_started_at.is_some());

        let done = job.complete("processed/user123/out.mp4");
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(
            done.output_location.as_deref(),
            Some("processed/user123/out.mp4")
        );
        assert!(done.error_message.is_none());
        assert!(done.processing_completed_at.is_some());
        assert!(done.processing_started_at.unwrap() <= done.processing_completed_at.unwrap());
    }

    #[test]
    fn test_job_fail_transition() {
        let job = Job::new("user123", "uploads/in.mp4").start();
        let failed = job.fail("decode failed: empty input");

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("decode failed: empty input")
        );
        assert!(failed.output_location.is_none());
        assert!(failed.processing_completed_at.is_some());
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_job_serde_roundtrip() {
        let job = Job::new("user_1", "uploads/in.mp4").start();
        let json = serde_json::to_string(&job).expect("serialize Job");
        let decoded: Job = serde_json::from_str(&json).expect("deserialize Job");

        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.status, JobStatus::Processing);
        assert_eq!(decoded.input_location, job.input_location);
    }
}
