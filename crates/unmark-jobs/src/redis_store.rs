//! Redis-backed job records.
//!
//! Each job is one JSON document under `unmark:job:{id}`, rewritten
//! whole on every transition — a single SET is atomic, so a reader never
//! observes a completed job without its output location or a failed job
//! without its error message. A per-owner index set backs job listing.
//!
//! Transitions are read-check-write rather than locked: the dispatch
//! layer guarantees at most one live worker per job, and the state-machine
//! checks reject any write that would move a job backwards.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use unmark_models::{Job, JobId};

use crate::error::{JobStoreError, JobStoreResult};
use crate::store::{apply_complete, apply_fail, apply_start, JobStore};

/// Redis-backed implementation of [`JobStore`].
pub struct RedisJobStore {
    client: redis::Client,
}

impl RedisJobStore {
    /// Create a new store against a Redis URL.
    pub fn new(redis_url: &str) -> JobStoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> JobStoreResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&redis_url)
    }

    fn job_key(id: &JobId) -> String {
        format!("unmark:job:{}", id)
    }

    fn owner_key(owner_id: &str) -> String {
        format!("unmark:owner:{}:jobs", owner_id)
    }

    async fn load(&self, id: &JobId) -> JobStoreResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(Self::job_key(id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, job: &Job) -> JobStoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.set::<_, _, ()>(Self::job_key(&job.id), payload).await?;
        Ok(())
    }

    async fn mutate<F>(&self, id: &JobId, f: F) -> JobStoreResult<Job>
    where
        F: FnOnce(Job) -> JobStoreResult<Job>,
    {
        let job = self
            .load(id)
            .await?
            .ok_or_else(|| JobStoreError::not_found(id.as_str()))?;
        let updated = f(job)?;
        self.save(&updated).await?;
        debug!("job {} -> {}", id, updated.status);
        Ok(updated)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, job: &Job) -> JobStoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let created: bool = conn
            .set_nx(Self::job_key(&job.id), payload)
            .await?;
        if !created {
            return Err(JobStoreError::AlreadyExists(job.id.to_string()));
        }

        conn.sadd::<_, _, ()>(Self::owner_key(&job.owner_id), job.id.as_str())
            .await?;

        debug!("created job {} for owner {}", job.id, job.owner_id);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> JobStoreResult<Option<Job>> {
        self.load(id).await
    }

    async fn list_for_owner(&self, owner_id: &str) -> JobStoreResult<Vec<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.smembers(Self::owner_key(owner_id)).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> = conn.get(format!("unmark:job:{}", id)).await?;
            if let Some(json) = payload {
                jobs.push(serde_json::from_str::<Job>(&json)?);
            }
        }

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn begin_processing(&self, id: &JobId) -> JobStoreResult<Job> {
        self.mutate(id, apply_start).await
    }

    async fn update_progress(&self, id: &JobId, progress: u8) -> JobStoreResult<()> {
        self.mutate(id, |job| Ok(job.with_progress(progress))).await?;
        Ok(())
    }

    async fn complete(&self, id: &JobId, output_location: &str) -> JobStoreResult<Job> {
        self.mutate(id, |job| apply_complete(job, output_location))
            .await
    }

    async fn fail(&self, id: &JobId, error: &str) -> JobStoreResult<Job> {
        self.mutate(id, |job| apply_fail(job, error)).await
    }
}
