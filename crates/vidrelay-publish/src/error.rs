//! Publishing error types.

use thiserror::Error;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    pub fn auth_failure(msg: impl Into<String>) -> Self {
        Self::AuthFailure(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Check if this is a quota error (not retryable until the quota resets).
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, PublishError::QuotaExceeded(_))
    }
}
