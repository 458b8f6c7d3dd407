//! Blob storage collaborator.
//!
//! This crate provides:
//! - The narrow `BlobStore` interface the pipeline consumes
//! - An S3-compatible client (`aws-sdk-s3`) for production
//! - A local-filesystem store for development and tests

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use store::{BlobStore, LocalStore};
