//! Worker error types.

use thiserror::Error;

use vidrelay_models::JobId;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Scheduler is shut down")]
    SchedulerClosed,

    #[error("Job {0} is already running")]
    AlreadyRunning(JobId),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
