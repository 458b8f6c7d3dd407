//! Progress events via Redis Pub/Sub.
//!
//! Observers of a job subscribe to its channel and receive
//! `(current, total, status)` updates while it runs, then a terminal
//! `done` or `error` event. The persisted job record remains the source
//! of truth; these events only exist so pollers and sockets can show
//! live movement.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use unmark_models::JobId;

use crate::error::QueueResult;

/// One progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// Work advanced: `current` of `total` units done
    Progress {
        current: u64,
        total: u64,
        status: String,
    },
    /// The job completed; output is at `output_location`
    Done {
        output_location: String,
        /// Time-limited download URL, when the publisher could mint one
        #[serde(skip_serializing_if = "Option::is_none")]
        download_url: Option<String>,
    },
    /// The job failed
    Error { message: String },
}

/// Progress event published to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job ID
    pub job_id: JobId,
    /// What happened
    pub update: ProgressUpdate,
}

/// Channel for publishing/subscribing to progress events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("unmark:progress:{}", job_id)
    }

    /// Publish a progress event.
    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a progress update.
    pub async fn progress(
        &self,
        job_id: &JobId,
        current: u64,
        total: u64,
        status: impl Into<String>,
    ) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            update: ProgressUpdate::Progress {
                current,
                total,
                status: status.into(),
            },
        })
        .await
    }

    /// Publish the terminal success event.
    pub async fn done(
        &self,
        job_id: &JobId,
        output_location: impl Into<String>,
        download_url: Option<String>,
    ) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            update: ProgressUpdate::Done {
                output_location: output_location.into(),
                download_url,
            },
        })
        .await
    }

    /// Publish the terminal error event.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            update: ProgressUpdate::Error {
                message: message.into(),
            },
        })
        .await
    }

    /// Subscribe to progress events for a job.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serde_roundtrip() {
        let event = ProgressEvent {
            job_id: JobId::new(),
            update: ProgressUpdate::Progress {
                current: 3,
                total: 10,
                status: "removing watermarks".to_string(),
            },
        };

        let json = serde_json::to_string(&event).expect("serialize ProgressEvent");
        let decoded: ProgressEvent = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(decoded.job_id, event.job_id);
        match decoded.update {
            ProgressUpdate::Progress { current, total, status } => {
                assert_eq!(current, 3);
                assert_eq!(total, 10);
                assert_eq!(status, "removing watermarks");
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_channel_name_is_per_job() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(
            ProgressChannel::channel_name(&a),
            ProgressChannel::channel_name(&b)
        );
        assert!(ProgressChannel::channel_name(&a).starts_with("unmark:progress:"));
    }
}
