//! The narrow storage interface the pipeline consumes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Blob storage as the core sees it: fetch an input to a local file,
/// store an output under a location key, presign a download.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download the object at `location` to `dest`.
    async fn fetch(&self, location: &str, dest: &Path) -> StorageResult<()>;

    /// Upload `src` under `location`, returning the recorded location.
    async fn store(&self, src: &Path, location: &str) -> StorageResult<String>;

    /// Generate a time-limited download URL for `location`.
    async fn presign(&self, location: &str, ttl: Duration) -> StorageResult<String>;

    /// Check whether `location` exists.
    async fn exists(&self, location: &str) -> StorageResult<bool>;

    /// Delete the object at `location`.
    async fn delete(&self, location: &str) -> StorageResult<()>;
}

/// Filesystem-backed store rooted at a directory. Location keys map to
/// relative paths; presigned URLs are plain `file://` URLs. Used by the
/// test harness and local development, where an object store would be
/// overkill.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> StorageResult<PathBuf> {
        if location.is_empty() || location.starts_with('/') || location.contains("..") {
            return Err(StorageError::InvalidKey(location.to_string()));
        }
        Ok(self.root.join(location))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn fetch(&self, location: &str, dest: &Path) -> StorageResult<()> {
        let src = self.resolve(location)?;
        if !src.exists() {
            return Err(StorageError::not_found(location));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&src, dest).await?;
        debug!("fetched {} to {}", location, dest.display());
        Ok(())
    }

    async fn store(&self, src: &Path, location: &str) -> StorageResult<String> {
        let dest = self.resolve(location)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(src, &dest).await?;
        debug!("stored {} as {}", src.display(), location);
        Ok(location.to_string())
    }

    async fn presign(&self, location: &str, _ttl: Duration) -> StorageResult<String> {
        let path = self.resolve(location)?;
        if !path.exists() {
            return Err(StorageError::not_found(location));
        }
        Ok(format!("file://{}", path.display()))
    }

    async fn exists(&self, location: &str) -> StorageResult<bool> {
        Ok(self.resolve(location)?.exists())
    }

    async fn delete(&self, location: &str) -> StorageResult<()> {
        let path = self.resolve(location)?;
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let root = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());

        let src = scratch.path().join("upload.bin");
        fs::write(&src, b"video bytes").await.unwrap();

        let key = store.store(&src, "uploads/u1/in.mp4").await.unwrap();
        assert_eq!(key, "uploads/u1/in.mp4");
        assert!(store.exists(&key).await.unwrap());

        let dest = scratch.path().join("download.bin");
        store.fetch(&key, &dest).await.unwrap();
        assert_eq!(fs::read(&dest).await.unwrap(), b"video bytes");

        let url = store.presign(&key, Duration::from_secs(60)).await.unwrap();
        assert!(url.starts_with("file://"));

        store.delete(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_missing_object() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());

        let err = store
            .fetch("uploads/nope.mp4", Path::new("/tmp/out.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_local_store_rejects_escaping_keys() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());

        for key in ["/etc/passwd", "../sibling", ""] {
            let err = store.exists(key).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "key: {key}");
        }
    }
}
