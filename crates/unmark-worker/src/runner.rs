//! The single-job task runner.
//!
//! `TaskRunner::run` is the worker-side entry point for one dispatched
//! job: it loads the persisted record, guards against duplicate
//! dispatch, walks the record through `pending -> processing -> terminal`,
//! and drives the removal pipeline in between. Every processing fault —
//! pipeline errors, storage errors, panics — lands as a `failed`
//! transition with the cause recorded, so a job never stays stuck in
//! `processing`.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use unmark_jobs::{JobStore, JobStoreError};
use unmark_media::RemovalPipeline;
use unmark_models::{Job, JobId, JobStatus};
use unmark_queue::{ProgressChannel, RemoveWatermarkJob};
use unmark_storage::BlobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Runs one job end to end.
pub struct TaskRunner {
    config: WorkerConfig,
    jobs: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    pipeline: Arc<RemovalPipeline>,
    progress: Option<Arc<ProgressChannel>>,
}

impl TaskRunner {
    pub fn new(
        config: WorkerConfig,
        jobs: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        pipeline: Arc<RemovalPipeline>,
    ) -> Self {
        Self {
            config,
            jobs,
            blobs,
            pipeline,
            progress: None,
        }
    }

    /// Attach a progress channel for live events.
    pub fn with_progress(mut self, progress: ProgressChannel) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Process one dispatched job to a terminal state.
    ///
    /// Returns `Ok` once a terminal state is durably recorded — a failed
    /// job is a successful delivery. `Err` means the job record itself
    /// could not be loaded or written; the message stays on the queue
    /// for redelivery in that case.
    pub async fn run(&self, dispatch: &RemoveWatermarkJob) -> WorkerResult<()> {
        let job_id = &dispatch.job_id;
        let logger = JobLogger::new(job_id, "watermark_removal");

        let Some(record) = self.jobs.get(job_id).await? else {
            return Err(WorkerError::job_not_found(job_id.as_str()));
        };

        // Duplicate-dispatch guard: the queue owes us at most one live
        // worker per job, but a redelivered message for a job that
        // already ran must not reprocess it.
        if record.status != JobStatus::Pending {
            logger.log_progress(&format!(
                "job is already {}, skipping duplicate dispatch",
                record.status
            ));
            return Ok(());
        }

        let record = match self.jobs.begin_processing(job_id).await {
            Ok(record) => record,
            // Another dispatch won the race between our status read and
            // this write; their run owns the job now.
            Err(JobStoreError::InvalidTransition { .. }) => {
                logger.log_progress("lost the dispatch race, skipping duplicate dispatch");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        logger.log_start("starting watermark removal");
        if let Some(progress) = &self.progress {
            progress
                .progress(job_id, 0, 0, "starting watermark removal")
                .await
                .ok();
        }

        let work_dir = PathBuf::from(&self.config.work_dir).join(job_id.as_str());

        let outcome = AssertUnwindSafe(self.process(&record, &work_dir))
            .catch_unwind()
            .await;

        // Scratch space goes away on success and failure alike.
        if work_dir.exists() {
            tokio::fs::remove_dir_all(&work_dir).await.ok();
        }

        match outcome {
            Ok(Ok(output_location)) => {
                self.jobs.complete(job_id, &output_location).await?;
                if let Some(progress) = &self.progress {
                    let download_url = self
                        .blobs
                        .presign(&output_location, self.config.presign_ttl)
                        .await
                        .ok();
                    progress
                        .done(job_id, output_location.as_str(), download_url)
                        .await
                        .ok();
                }
                counter!("unmark_jobs_completed_total").increment(1);
                logger.log_completion(&format!("output stored at {}", output_location));
                Ok(())
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                logger.log_error(&message);
                self.fail_job(job_id, &message).await
            }
            Err(panic) => {
                let message = format!("unexpected failure: {}", panic_message(panic));
                logger.log_error(&message);
                self.fail_job(job_id, &message).await
            }
        }
    }

    /// Record a `failed` terminal state for a job that is not already
    /// terminal. Used internally and by the executor for timeouts.
    pub async fn fail_job(&self, job_id: &JobId, message: &str) -> WorkerResult<()> {
        match self.jobs.fail(job_id, message).await {
            Ok(_) => {
                if let Some(progress) = &self.progress {
                    progress.error(job_id, message).await.ok();
                }
                counter!("unmark_jobs_failed_total").increment(1);
                Ok(())
            }
            // A terminal record is already in place; nothing to repair.
            Err(JobStoreError::InvalidTransition { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the input, run the pipeline, store the output. Returns the
    /// recorded output location.
    async fn process(&self, record: &Job, work_dir: &Path) -> WorkerResult<String> {
        tokio::fs::create_dir_all(work_dir).await?;

        let input_path = work_dir.join("source.mp4");
        self.blobs.fetch(&record.input_location, &input_path).await?;

        let output_path = work_dir.join("processed.mp4");

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = self.spawn_progress_forwarder(record.id.clone(), rx);

        let report = self
            .pipeline
            .run(&input_path, &output_path, move |current, total, status| {
                tx.send((current, total, status.to_string())).ok();
            })
            .await?;
        forwarder.await.ok();

        let output_key = format!("processed/{}/{}.mp4", record.owner_id, record.id);
        let location = self.blobs.store(&output_path, &output_key).await?;

        info!(
            job_id = %record.id,
            frames = report.frames_total,
            inpainted = report.frames_inpainted,
            audio = report.audio.has_audio(),
            "pipeline finished"
        );

        Ok(location)
    }

    /// Forward per-frame progress to the persisted record and the live
    /// channel, throttled to whole-percent changes so long videos do not
    /// hammer Redis.
    fn spawn_progress_forwarder(
        &self,
        job_id: JobId,
        mut rx: mpsc::UnboundedReceiver<(usize, usize, String)>,
    ) -> JoinHandle<()> {
        let jobs = Arc::clone(&self.jobs);
        let progress = self.progress.clone();

        tokio::spawn(async move {
            let mut last_percent: i64 = -1;
            while let Some((current, total, status)) = rx.recv().await {
                let percent = if total == 0 {
                    0
                } else {
                    (current * 100 / total) as i64
                };
                if percent == last_percent {
                    continue;
                }
                last_percent = percent;

                if let Err(e) = jobs.update_progress(&job_id, percent as u8).await {
                    warn!("failed to persist progress for {}: {}", job_id, e);
                }
                if let Some(p) = &progress {
                    p.progress(&job_id, current as u64, total as u64, status.as_str())
                        .await
                        .ok();
                }
            }
        })
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
