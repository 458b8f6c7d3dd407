//! The job persistence interface.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use unmark_models::{Job, JobId, JobStatus};

use crate::error::{JobStoreError, JobStoreResult};

/// Persisted job records as the worker and status surfaces see them.
///
/// Lifecycle mutations enforce the one-directional state machine: a job
/// can only enter `processing` from `pending`, and only reach a terminal
/// state from `processing`. Terminal writes land together with their
/// companion field (output location or error message), so a concurrent
/// reader never observes a half-applied terminal state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly created (pending) job.
    async fn create(&self, job: &Job) -> JobStoreResult<()>;

    /// Load a job by ID.
    async fn get(&self, id: &JobId) -> JobStoreResult<Option<Job>>;

    /// List all jobs belonging to an owner.
    async fn list_for_owner(&self, owner_id: &str) -> JobStoreResult<Vec<Job>>;

    /// Transition `pending -> processing`, recording the start time.
    /// Returns the updated job.
    async fn begin_processing(&self, id: &JobId) -> JobStoreResult<Job>;

    /// Record progress (0-100) on a processing job.
    async fn update_progress(&self, id: &JobId, progress: u8) -> JobStoreResult<()>;

    /// Transition `processing -> completed`, recording the output
    /// location and end time. Returns the updated job.
    async fn complete(&self, id: &JobId, output_location: &str) -> JobStoreResult<Job>;

    /// Transition to `failed`, recording the error message and end time.
    /// Returns the updated job.
    async fn fail(&self, id: &JobId, error: &str) -> JobStoreResult<Job>;
}

/// Apply the `pending -> processing` transition, or explain why not.
pub(crate) fn apply_start(job: Job) -> JobStoreResult<Job> {
    if job.status != JobStatus::Pending {
        return Err(JobStoreError::invalid_transition(
            job.status,
            JobStatus::Processing,
        ));
    }
    Ok(job.start())
}

/// Apply the `processing -> completed` transition, or explain why not.
pub(crate) fn apply_complete(job: Job, output_location: &str) -> JobStoreResult<Job> {
    if job.status != JobStatus::Processing {
        return Err(JobStoreError::invalid_transition(
            job.status,
            JobStatus::Completed,
        ));
    }
    Ok(job.complete(output_location))
}

/// Apply the transition to `failed`, or explain why not. Failure is
/// reachable from both `pending` and `processing` (a job can die before
/// its first pipeline stage), but never from a terminal state.
pub(crate) fn apply_fail(job: Job, error: &str) -> JobStoreResult<Job> {
    if job.status.is_terminal() {
        return Err(JobStoreError::invalid_transition(
            job.status,
            JobStatus::Failed,
        ));
    }
    Ok(job.fail(error))
}

/// In-memory store used by the test harness.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, id: &JobId, f: F) -> JobStoreResult<Job>
    where
        F: FnOnce(Job) -> JobStoreResult<Job>,
    {
        let mut jobs = self.jobs.lock().expect("job store lock");
        let job = jobs
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| JobStoreError::not_found(id.as_str()))?;
        let updated = f(job)?;
        jobs.insert(id.as_str().to_string(), updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> JobStoreResult<()> {
        let mut jobs = self.jobs.lock().expect("job store lock");
        if jobs.contains_key(job.id.as_str()) {
            return Err(JobStoreError::AlreadyExists(job.id.to_string()));
        }
        jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> JobStoreResult<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .expect("job store lock")
            .get(id.as_str())
            .cloned())
    }

    async fn list_for_owner(&self, owner_id: &str) -> JobStoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .expect("job store lock")
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn begin_processing(&self, id: &JobId) -> JobStoreResult<Job> {
        self.mutate(id, apply_start)
    }

    async fn update_progress(&self, id: &JobId, progress: u8) -> JobStoreResult<()> {
        self.mutate(id, |job| Ok(job.with_progress(progress)))?;
        Ok(())
    }

    async fn complete(&self, id: &JobId, output_location: &str) -> JobStoreResult<Job> {
        self.mutate(id, |job| apply_complete(job, output_location))
    }

    async fn fail(&self, id: &JobId, error: &str) -> JobStoreResult<Job> {
        self.mutate(id, |job| apply_fail(job, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryJobStore::new();
        let job = Job::new("user_1", "uploads/in.mp4");
        let id = job.id.clone();

        store.create(&job).await.unwrap();

        let started = store.begin_processing(&id).await.unwrap();
        assert_eq!(started.status, JobStatus::Processing);

        store.update_progress(&id, 40).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().unwrap().progress, 40);

        let done = store.complete(&id, "processed/user_1/out.mp4").await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.output_location.is_some());
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let store = MemoryJobStore::new();
        let job = Job::new("user_1", "uploads/in.mp4");
        let id = job.id.clone();
        store.create(&job).await.unwrap();

        store.begin_processing(&id).await.unwrap();
        store.fail(&id, "decode failed: empty input").await.unwrap();

        // No way back from failed.
        assert!(matches!(
            store.begin_processing(&id).await,
            Err(JobStoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.complete(&id, "anywhere").await,
            Err(JobStoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.fail(&id, "again").await,
            Err(JobStoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_processing_requires_pending() {
        let store = MemoryJobStore::new();
        let job = Job::new("user_1", "uploads/in.mp4");
        let id = job.id.clone();
        store.create(&job).await.unwrap();

        store.begin_processing(&id).await.unwrap();
        assert!(matches!(
            store.begin_processing(&id).await,
            Err(JobStoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_allowed_from_pending() {
        let store = MemoryJobStore::new();
        let job = Job::new("user_1", "uploads/in.mp4");
        let id = job.id.clone();
        store.create(&job).await.unwrap();

        let failed = store.fail(&id, "input vanished before dispatch").await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_list_for_owner_filters_and_orders() {
        let store = MemoryJobStore::new();
        let a = Job::new("alice", "uploads/a.mp4");
        let b = Job::new("bob", "uploads/b.mp4");
        let c = Job::new("alice", "uploads/c.mp4");
        for job in [&a, &b, &c] {
            store.create(job).await.unwrap();
        }

        let jobs = store.list_for_owner("alice").await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.owner_id == "alice"));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryJobStore::new();
        let job = Job::new("user_1", "uploads/in.mp4");
        store.create(&job).await.unwrap();
        assert!(matches!(
            store.create(&job).await,
            Err(JobStoreError::AlreadyExists(_))
        ));
    }
}
