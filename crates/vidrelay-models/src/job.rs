//! Job descriptor and lifecycle state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::{JobFailure, JobOutcome, PublishedVideo};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Waiting for a worker slot
    #[default]
    Queued,
    /// Fetching the source media
    Downloading,
    /// Deriving title, description and tags
    GeneratingMetadata,
    /// Uploading to the hosting platform
    Uploading,
    /// Published
    Succeeded,
    /// Terminal failure
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Downloading => "downloading",
            JobStage::GeneratingMetadata => "generating_metadata",
            JobStage::Uploading => "uploading",
            JobStage::Succeeded => "succeeded",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Succeeded | JobStage::Failed)
    }

    /// Stage that follows this one on the success path.
    pub fn next(&self) -> Option<JobStage> {
        match self {
            JobStage::Queued => Some(JobStage::Downloading),
            JobStage::Downloading => Some(JobStage::GeneratingMetadata),
            JobStage::GeneratingMetadata => Some(JobStage::Uploading),
            JobStage::Uploading => Some(JobStage::Succeeded),
            JobStage::Succeeded | JobStage::Failed => None,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a job came from, and where its results go.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Caller blocks on the result; no out-of-band delivery.
    Synchronous,
    /// Messaging channel; results are sent to `address`.
    Channel { address: String },
}

impl Origin {
    pub fn channel(address: impl Into<String>) -> Self {
        Origin::Channel {
            address: address.into(),
        }
    }

    /// Reply target for channel jobs.
    pub fn reply_address(&self) -> Option<&str> {
        match self {
            Origin::Synchronous => None,
            Origin::Channel { address } => Some(address),
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, Origin::Channel { .. })
    }
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: JobStage, to: JobStage },

    #[error("Job already finished as {0}")]
    AlreadyTerminal(JobStage),

    #[error("Media can only be attached while downloading, job is {0}")]
    MediaOutsideDownload(JobStage),
}

/// One video-processing request.
///
/// `local_media` points at the downloaded file while the job owns one: it
/// is set during `downloading` and cleared before the job turns terminal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Input reference as submitted
    pub source_url: String,

    /// Submission origin
    pub origin: Origin,

    /// Current stage
    #[serde(default)]
    stage: JobStage,

    /// Terminal outcome, set once
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JobOutcome>,

    /// Downloaded media, between download and release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    local_media: Option<PathBuf>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a queued job.
    pub fn new(source_url: impl Into<String>, origin: Origin) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source_url: source_url.into(),
            origin,
            stage: JobStage::Queued,
            result: None,
            local_media: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn result(&self) -> Option<&JobOutcome> {
        self.result.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn local_media(&self) -> Option<&Path> {
        self.local_media.as_deref()
    }

    /// Record the file the download produced.
    pub fn attach_media(&mut self, path: impl Into<PathBuf>) -> Result<(), StageError> {
        if self.stage != JobStage::Downloading {
            return Err(StageError::MediaOutsideDownload(self.stage));
        }
        self.local_media = Some(path.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Forget the media once it has been released.
    pub fn detach_media(&mut self) -> Option<PathBuf> {
        self.local_media.take()
    }

    /// Move one step forward along the success path.
    ///
    /// Only the immediate successor of the current stage is accepted, and
    /// `Succeeded` can only be reached through [`Job::succeed`].
    pub fn advance(&mut self, to: JobStage) -> Result<(), StageError> {
        if self.stage.is_terminal() {
            return Err(StageError::AlreadyTerminal(self.stage));
        }
        if to.is_terminal() || self.stage.next() != Some(to) {
            return Err(StageError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the published video. Only valid from `Uploading`.
    pub fn succeed(&mut self, video: PublishedVideo) -> Result<(), StageError> {
        if self.stage.is_terminal() {
            return Err(StageError::AlreadyTerminal(self.stage));
        }
        if self.stage != JobStage::Uploading {
            return Err(StageError::InvalidTransition {
                from: self.stage,
                to: JobStage::Succeeded,
            });
        }
        self.finish(JobStage::Succeeded, JobOutcome::Published(video));
        Ok(())
    }

    /// Record a failure. Valid from any non-terminal stage.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), StageError> {
        if self.stage.is_terminal() {
            return Err(StageError::AlreadyTerminal(self.stage));
        }
        self.finish(JobStage::Failed, JobOutcome::Failed(failure));
        Ok(())
    }

    fn finish(&mut self, stage: JobStage, outcome: JobOutcome) {
        self.stage = stage;
        self.result = Some(outcome);
        self.local_media = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, PublishedId, Visibility};

    fn published() -> PublishedVideo {
        PublishedVideo {
            id: PublishedId::new("v1"),
            url: "https://host/watch?v=v1".to_string(),
            visibility: Visibility::Private,
        }
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        let b = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_stages_advance_in_order() {
        let mut job = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        assert_eq!(job.stage(), JobStage::Queued);
        assert!(job.result().is_none());

        job.advance(JobStage::Downloading).unwrap();
        job.advance(JobStage::GeneratingMetadata).unwrap();
        job.advance(JobStage::Uploading).unwrap();
        job.succeed(published()).unwrap();

        assert_eq!(job.stage(), JobStage::Succeeded);
        assert!(matches!(job.result(), Some(JobOutcome::Published(_))));
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut job = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        let err = job.advance(JobStage::Uploading).unwrap_err();
        assert_eq!(
            err,
            StageError::InvalidTransition {
                from: JobStage::Queued,
                to: JobStage::Uploading
            }
        );
        assert_eq!(job.stage(), JobStage::Queued);
    }

    #[test]
    fn test_moving_backwards_is_rejected() {
        let mut job = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        job.advance(JobStage::Downloading).unwrap();
        job.advance(JobStage::GeneratingMetadata).unwrap();
        assert!(job.advance(JobStage::Downloading).is_err());
    }

    #[test]
    fn test_succeed_requires_uploading() {
        let mut job = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        job.advance(JobStage::Downloading).unwrap();
        assert!(job.succeed(published()).is_err());
        assert!(job.result().is_none());
    }

    #[test]
    fn test_fail_from_any_running_stage() {
        for steps in 0..4 {
            let mut job = Job::new("https://example.com/a.mp4", Origin::channel("+15550001"));
            let mut stage = JobStage::Queued;
            for _ in 0..steps {
                stage = stage.next().unwrap();
                job.advance(stage).unwrap();
            }
            job.fail(JobFailure::new(FailureKind::Internal, "boom"))
                .unwrap();
            assert_eq!(job.stage(), JobStage::Failed);
        }
    }

    #[test]
    fn test_result_is_set_once() {
        let mut job = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        job.fail(JobFailure::new(FailureKind::DownloadFailed, "unreachable"))
            .unwrap();

        let err = job
            .fail(JobFailure::new(FailureKind::Internal, "again"))
            .unwrap_err();
        assert_eq!(err, StageError::AlreadyTerminal(JobStage::Failed));
        assert!(job.advance(JobStage::Downloading).is_err());

        match job.result() {
            Some(JobOutcome::Failed(failure)) => {
                assert_eq!(failure.kind, FailureKind::DownloadFailed)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_media_only_attaches_while_downloading() {
        let mut job = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        assert_eq!(
            job.attach_media("/tmp/video_a.mp4").unwrap_err(),
            StageError::MediaOutsideDownload(JobStage::Queued)
        );

        job.advance(JobStage::Downloading).unwrap();
        job.attach_media("/tmp/video_a.mp4").unwrap();
        job.advance(JobStage::GeneratingMetadata).unwrap();
        assert_eq!(job.local_media(), Some(Path::new("/tmp/video_a.mp4")));
        assert!(job.attach_media("/tmp/video_b.mp4").is_err());

        assert_eq!(job.detach_media(), Some(PathBuf::from("/tmp/video_a.mp4")));
        assert!(job.local_media().is_none());
    }

    #[test]
    fn test_terminal_job_holds_no_media() {
        let mut job = Job::new("https://example.com/a.mp4", Origin::Synchronous);
        job.advance(JobStage::Downloading).unwrap();
        job.attach_media("/tmp/video_a.mp4").unwrap();

        job.fail(JobFailure::internal("boom")).unwrap();

        assert!(job.local_media().is_none());
    }

    #[test]
    fn test_origin_reply_address() {
        assert_eq!(Origin::Synchronous.reply_address(), None);
        assert_eq!(
            Origin::channel("+15550001").reply_address(),
            Some("+15550001")
        );
    }
}
