//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with idempotency-key dedup
//! - Worker consumption with retry counters and a dead-letter stream
//! - Progress events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::RemoveWatermarkJob;
pub use progress::{ProgressChannel, ProgressEvent, ProgressUpdate};
pub use queue::{JobQueue, QueueConfig};
