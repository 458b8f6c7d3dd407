//! Worker configuration.

use std::time::Duration;

use unmark_media::{DetectorKind, InpainterKind};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Per-job processing timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for temporary files
    pub work_dir: String,
    /// How often the worker scans for orphaned pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message is claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Which detection strategy to run
    pub detector: DetectorKind,
    /// Which inpainting strategy to run
    pub inpainter: InpainterKind,
    /// TTL for presigned download URLs
    pub presign_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/unmark".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            detector: DetectorKind::default(),
            inpainter: InpainterKind::default(),
            presign_ttl: Duration::from_secs(3600),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .unwrap_or_else(|_| "/tmp/unmark".to_string()),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            detector: std::env::var("WATERMARK_DETECTOR")
                .ok()
                .and_then(|s| DetectorKind::parse(&s))
                .unwrap_or_default(),
            inpainter: std::env::var("WATERMARK_INPAINTER")
                .ok()
                .and_then(|s| InpainterKind::parse(&s))
                .unwrap_or_default(),
            presign_ttl: Duration::from_secs(
                std::env::var("PRESIGN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.detector, DetectorKind::CornerContrast);
        assert_eq!(config.inpainter, InpainterKind::Median);
    }
}
