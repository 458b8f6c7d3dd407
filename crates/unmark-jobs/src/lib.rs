//! Persisted job records.
//!
//! This crate provides:
//! - The `JobStore` interface the worker mutates and API surfaces poll
//! - A Redis-backed implementation (one JSON document per job, written
//!   whole so terminal transitions are atomic to readers)
//! - An in-memory implementation for tests

pub mod error;
pub mod redis_store;
pub mod store;

pub use error::{JobStoreError, JobStoreResult};
pub use redis_store::RedisJobStore;
pub use store::{JobStore, MemoryJobStore};
