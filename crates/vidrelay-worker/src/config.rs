//! Worker configuration.

use std::time::Duration;

use vidrelay_models::Visibility;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrently executing asynchronous jobs
    pub max_concurrent_jobs: usize,
    /// Time budget for the download stage
    pub download_timeout: Duration,
    /// Time budget for the metadata stage
    pub metadata_timeout: Duration,
    /// Time budget for the upload stage
    pub upload_timeout: Duration,
    /// Time budget for the post-upload visibility change
    pub visibility_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Visibility applied after a successful upload
    pub publish_visibility: Visibility,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            download_timeout: Duration::from_secs(600),
            metadata_timeout: Duration::from_secs(120),
            upload_timeout: Duration::from_secs(1800),
            visibility_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            publish_visibility: Visibility::Private,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(2)
                .max(1),
            download_timeout: Duration::from_secs(
                std::env::var("WORKER_DOWNLOAD_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            metadata_timeout: Duration::from_secs(
                std::env::var("WORKER_METADATA_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            upload_timeout: Duration::from_secs(
                std::env::var("WORKER_UPLOAD_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            visibility_timeout: Duration::from_secs(
                std::env::var("WORKER_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            publish_visibility: std::env::var("PUBLISH_VISIBILITY")
                .ok()
                .and_then(|s| Visibility::parse(&s))
                .unwrap_or_default(),
        }
    }
}
