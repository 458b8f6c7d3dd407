//! Watermark-removal worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use unmark_jobs::RedisJobStore;
use unmark_media::{
    build_detector, build_inpainter, FfmpegAudioMuxer, FfmpegFrameCodec, RemovalPipeline,
};
use unmark_queue::{JobQueue, ProgressChannel};
use unmark_storage::S3Client;
use unmark_worker::{JobExecutor, TaskRunner, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS Redis/S3)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("unmark=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting unmark-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let jobs = match RedisJobStore::new(&redis_url) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create job store: {}", e);
            std::process::exit(1);
        }
    };

    let blobs = match S3Client::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };

    let progress = match ProgressChannel::new(&redis_url) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create progress channel: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = Arc::new(RemovalPipeline::new(
        Arc::new(FfmpegFrameCodec::new()),
        Arc::from(build_detector(config.detector)),
        Arc::from(build_inpainter(config.inpainter)),
        Arc::new(FfmpegAudioMuxer::new()),
    ));

    let runner =
        TaskRunner::new(config.clone(), jobs, blobs, pipeline).with_progress(progress);

    let executor = Arc::new(JobExecutor::new(config, queue, runner));

    // Trip the shutdown signal on ctrl-c
    let shutdown_handle = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_handle.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
