//! Failure taxonomy and terminal outcomes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::PublishedVideo;

/// Reason string used when a stage exceeds its time budget.
pub const TIMEOUT_REASON: &str = "timeout";

/// Which part of the pipeline produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Fetching the source media failed
    DownloadFailed,
    /// Deriving metadata failed
    MetadataFailed,
    /// Uploading to the hosting platform failed
    PublishFailed,
    /// Unexpected fault caught at an execution boundary
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::DownloadFailed => "download_failed",
            FailureKind::MetadataFailed => "metadata_failed",
            FailureKind::PublishFailed => "publish_failed",
            FailureKind::Internal => "internal",
        }
    }
}

/// A classified pipeline failure with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, reason)
    }

    pub fn timeout(kind: FailureKind) -> Self {
        Self::new(kind, TIMEOUT_REASON)
    }

    pub fn is_timeout(&self) -> bool {
        self.reason == TIMEOUT_REASON
    }

    /// Short message suitable for end users.
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::DownloadFailed => format!("Failed to download video: {}", self.reason),
            FailureKind::MetadataFailed => {
                format!("Failed to generate metadata: {}", self.reason)
            }
            FailureKind::PublishFailed => format!("Failed to upload video: {}", self.reason),
            FailureKind::Internal => format!("Internal error: {}", self.reason),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Published(PublishedVideo),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Published(_))
    }

    pub fn video(&self) -> Option<&PublishedVideo> {
        match self {
            JobOutcome::Published(video) => Some(video),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobOutcome::Published(_) => None,
            JobOutcome::Failed(failure) => Some(failure),
        }
    }
}
