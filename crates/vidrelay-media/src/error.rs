//! Error types for media operations.

use thiserror::Error;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for metadata generation.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Errors that can occur while retrieving source media.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Source unreachable: {0}")]
    Unreachable(String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedSource(msg.into())
    }
}

/// Errors that can occur while deriving metadata.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Media file is empty")]
    EmptyMedia,

    #[error("Media file unreadable: {0}")]
    MediaUnreadable(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
