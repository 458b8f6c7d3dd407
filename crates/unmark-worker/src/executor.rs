//! Job executor.
//!
//! Consumes dispatch messages from the queue and hands each to the task
//! runner under a concurrency limit. Delivery-level failures (the job
//! record could not be reached) are retried up to the queue's maximum
//! and then dead-lettered; job-level outcomes are already terminal by
//! the time the runner returns.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use unmark_queue::{JobQueue, RemoveWatermarkJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::runner::TaskRunner;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    runner: Arc<TaskRunner>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue, runner: TaskRunner) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            runner: Arc::new(runner),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim messages abandoned by crashed workers.
        let queue_clone = Arc::clone(&self.queue);
        let runner_clone = Arc::clone(&self.runner);
        let consumer_name = self.consumer_name.clone();
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_interval = self.config.claim_interval;
        let claim_min_idle = self.config.claim_min_idle;
        let job_timeout = self.config.job_timeout;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone
                            .claim_pending(&consumer_name, claim_min_idle.as_millis() as u64, 5)
                            .await
                        {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let queue = Arc::clone(&queue_clone);
                                    let runner = Arc::clone(&runner_clone);
                                    let Ok(permit) =
                                        semaphore_clone.clone().acquire_owned().await
                                    else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(
                                            runner, queue, job_timeout, message_id, job,
                                        )
                                        .await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main job consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and spawn jobs up to the available concurrency.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let queue = Arc::clone(&self.queue);
            let runner = Arc::clone(&self.runner);
            let job_timeout = self.config.job_timeout;
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(runner, queue, job_timeout, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single dispatch with timeout, retry, and DLQ handling.
    async fn execute_job(
        runner: Arc<TaskRunner>,
        queue: Arc<JobQueue>,
        job_timeout: Duration,
        message_id: String,
        job: RemoveWatermarkJob,
    ) {
        let job_id = job.job_id.clone();
        info!("Executing job {}", job_id);

        let result = match tokio::time::timeout(job_timeout, runner.run(&job)).await {
            Ok(result) => result,
            Err(_) => {
                // The processing future was dropped; make sure the record
                // still reaches a terminal state.
                warn!(
                    "Job {} timed out after {}s",
                    job_id,
                    job_timeout.as_secs()
                );
                runner
                    .fail_job(
                        &job_id,
                        &format!("processing timed out after {}s", job_timeout.as_secs()),
                    )
                    .await
            }
        };

        match result {
            Ok(()) => {
                debug!("Delivery for job {} settled", job_id);
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                // Terminal state reached; allow future re-submission.
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!("Delivery for job {} failed: {}", job_id, e);
                counter!("unmark_deliveries_retried_total").increment(1);

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(999);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        "Job {} exceeded max retries ({}), moving to DLQ",
                        job_id, max_retries
                    );
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!("Failed to move job {} to DLQ: {}", job_id, dlq_err);
                    }
                    if let Err(e) = queue.clear_dedup(&job).await {
                        warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                    }
                    // Best effort: leave a terminal record behind.
                    runner
                        .fail_job(
                            &job_id,
                            &format!("delivery failed after {} retries: {}", max_retries, e),
                        )
                        .await
                        .ok();
                } else {
                    info!(
                        "Job {} will be retried (attempt {}/{})",
                        job_id, retry_count, max_retries
                    );
                    // Redelivered after the visibility timeout.
                }
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
