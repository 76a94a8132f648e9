//! Three-stage job pipeline: download, generate metadata, publish.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{error, info, warn, Instrument};

use vidrelay_media::{Fetcher, LocalMediaHandle, MetadataGenerator};
use vidrelay_models::{
    FailureKind, Job, JobFailure, JobId, JobOutcome, JobStage, Origin, PublishedId,
    PublishedVideo, VideoMetadata, Visibility,
};
use vidrelay_notify::Notifier;
use vidrelay_publish::{progress_channel, ProgressReceiver, Publisher};

use crate::config::WorkerConfig;
use crate::logging;
use crate::metrics;

/// Time budget per stage.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub download: Duration,
    pub metadata: Duration,
    pub upload: Duration,
    /// Post-upload `set_visibility` call
    pub visibility: Duration,
}

impl From<&WorkerConfig> for StageTimeouts {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            download: config.download_timeout,
            metadata: config.metadata_timeout,
            upload: config.upload_timeout,
            visibility: config.visibility_timeout,
        }
    }
}

/// Runs one job through the adapters and reports on it.
///
/// The pipeline never returns an error and never unwinds: every failure,
/// timeout or panic, in an adapter or a notifier, ends as a `Failed`
/// outcome recorded on the job, and downloaded media is released on every
/// path.
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    generator: Arc<dyn MetadataGenerator>,
    publisher: Arc<dyn Publisher>,
    notifier: Arc<dyn Notifier>,
    timeouts: StageTimeouts,
    visibility: Visibility,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        generator: Arc<dyn MetadataGenerator>,
        publisher: Arc<dyn Publisher>,
        notifier: Arc<dyn Notifier>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            fetcher,
            generator,
            publisher,
            notifier,
            timeouts: StageTimeouts::from(config),
            visibility: config.publish_visibility,
        }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Run a queued job to a terminal stage and return its outcome.
    ///
    /// Channel-origin jobs get stage, progress and result notifications;
    /// synchronous jobs get none.
    pub async fn run(&self, job: &mut Job) -> JobOutcome {
        let span = logging::job_span(job);
        self.run_job(job).instrument(span).await
    }

    async fn run_job(&self, job: &mut Job) -> JobOutcome {
        if job.stage() != JobStage::Queued {
            let failure = JobFailure::internal(format!("job is {}, not queued", job.stage()));
            error!("{}", failure.reason);
            return JobOutcome::Failed(failure);
        }

        info!(source_url = %job.source_url, "Job started");
        let started = Instant::now();

        // Stage notifications run outside the adapter guards.
        let result = match AssertUnwindSafe(self.execute(job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(JobFailure::internal(panic_message(panic.as_ref()))),
        };

        let recorded = match &result {
            Ok(video) => job.succeed(video.clone()),
            Err(failure) => job.fail(failure.clone()),
        };
        if let Err(e) = recorded {
            error!("Could not record outcome: {}", e);
        }

        let outcome = match result {
            Ok(video) => {
                metrics::record_job_completed();
                JobOutcome::Published(video)
            }
            Err(failure) => {
                metrics::record_job_failed(failure.kind);
                JobOutcome::Failed(failure)
            }
        };
        logging::log_outcome(&outcome, started.elapsed());

        if job.origin.is_channel() {
            let report = self.notifier.notify_result(&job.id, &job.origin, &outcome);
            if let Err(panic) = AssertUnwindSafe(report).catch_unwind().await {
                error!("Result notification failed: {}", panic_message(panic.as_ref()));
            }
        }
        outcome
    }

    async fn execute(&self, job: &mut Job) -> Result<PublishedVideo, JobFailure> {
        self.enter(job, JobStage::Downloading).await?;
        let handle = timed(
            JobStage::Downloading,
            guarded(
                FailureKind::DownloadFailed,
                self.timeouts.download,
                self.fetcher.fetch(&job.source_url),
            ),
        )
        .await?;
        info!(path = %handle.path().display(), "Media downloaded");

        // Anything after the download must fall through to the release below.
        let result = match job.attach_media(handle.path()) {
            Ok(()) => match AssertUnwindSafe(self.process(job, &handle))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(JobFailure::internal(panic_message(panic.as_ref()))),
            },
            Err(e) => Err(JobFailure::internal(e.to_string())),
        };

        job.detach_media();
        self.fetcher.release(handle).await;
        result
    }

    async fn process(
        &self,
        job: &mut Job,
        handle: &LocalMediaHandle,
    ) -> Result<PublishedVideo, JobFailure> {
        self.enter(job, JobStage::GeneratingMetadata).await?;
        let metadata = timed(
            JobStage::GeneratingMetadata,
            guarded(
                FailureKind::MetadataFailed,
                self.timeouts.metadata,
                self.generator.generate(handle),
            ),
        )
        .await?;
        info!(title = %metadata.title, tags = metadata.tags.len(), "Metadata ready");

        self.enter(job, JobStage::Uploading).await?;
        let id = timed(
            JobStage::Uploading,
            self.upload(&job.id, &job.origin, handle, &metadata),
        )
        .await?;

        let url = self.publisher.resolve_view_url(&id);
        let visibility = self.apply_visibility(&id).await;

        Ok(PublishedVideo { id, url, visibility })
    }

    /// Advance the job and announce the stage.
    async fn enter(&self, job: &mut Job, stage: JobStage) -> Result<(), JobFailure> {
        job.advance(stage)
            .map_err(|e| JobFailure::internal(e.to_string()))?;
        logging::enter_stage(stage);

        if job.origin.is_channel() {
            self.notifier.notify_stage(&job.id, &job.origin, stage).await;
        }
        Ok(())
    }

    /// Publish while relaying progress to the notifier.
    async fn upload(
        &self,
        job_id: &JobId,
        origin: &Origin,
        handle: &LocalMediaHandle,
        metadata: &VideoMetadata,
    ) -> Result<PublishedId, JobFailure> {
        let (tx, rx) = progress_channel();
        let publish = guarded(
            FailureKind::PublishFailed,
            self.timeouts.upload,
            self.publisher.publish(handle, metadata, tx),
        );

        if !origin.is_channel() {
            drop(rx);
            return publish.await;
        }

        let (result, ()) = tokio::join!(publish, self.forward_progress(job_id, origin, rx));
        result
    }

    /// Ends when the publisher drops its sender.
    async fn forward_progress(&self, job_id: &JobId, origin: &Origin, mut rx: ProgressReceiver) {
        while let Some(percent) = rx.recv().await {
            self.notifier
                .notify_progress(job_id, origin, percent.min(100))
                .await;
        }
    }

    /// Uploads start private; anything else is applied afterwards.
    async fn apply_visibility(&self, id: &PublishedId) -> Visibility {
        if self.visibility == Visibility::Private {
            return Visibility::Private;
        }

        match guarded(
            FailureKind::PublishFailed,
            self.timeouts.visibility,
            self.publisher.set_visibility(id, self.visibility),
        )
        .await
        {
            Ok(()) => self.visibility,
            Err(failure) => {
                warn!(
                    video_id = %id,
                    "Could not set visibility to {}: {}",
                    self.visibility, failure.reason
                );
                Visibility::Private
            }
        }
    }
}

/// Bound an adapter call by `limit` and contain panics.
///
/// On timeout the adapter future is dropped; adapters clean up partial
/// local state in `Drop`.
async fn guarded<T, E, F>(kind: FailureKind, limit: Duration, fut: F) -> Result<T, JobFailure>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => Err(JobFailure::timeout(kind)),
        Ok(Err(panic)) => Err(JobFailure::internal(panic_message(panic.as_ref()))),
        Ok(Ok(Err(e))) => Err(JobFailure::new(kind, e.to_string())),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

async fn timed<T, F>(stage: JobStage, fut: F) -> T
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    let out = fut.await;
    metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
    out
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("unexpected fault: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("unexpected fault: {}", s)
    } else {
        "unexpected fault".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        Fakes, FakeFetcher, FakeGenerator, FakePublisher, NotifyEvent, RecordingNotifier,
    };
    use vidrelay_models::SubmitResponse;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            download_timeout: Duration::from_millis(200),
            metadata_timeout: Duration::from_millis(200),
            upload_timeout: Duration::from_millis(200),
            ..WorkerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sync_success_publishes_and_releases() {
        let fakes = Fakes::default();
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        let video = outcome.video().expect("published");
        assert_eq!(video.url, format!("https://videos.test/watch?v={}", video.id));
        assert_eq!(video.visibility, Visibility::Private);
        assert_eq!(job.stage(), JobStage::Succeeded);
        assert_eq!(job.result(), Some(&outcome));
        assert!(job.local_media().is_none());

        assert_eq!(fakes.fetcher.fetch_calls().len(), 1);
        assert_eq!(fakes.generator.calls(), 1);
        assert_eq!(fakes.publisher.calls(), 1);
        assert_eq!(fakes.fetcher.released().len(), 1);
        assert!(!fakes.fetcher.released()[0].exists());

        // Synchronous jobs are never notified.
        assert!(fakes.notifier.events().is_empty());

        match SubmitResponse::from(&outcome) {
            SubmitResponse::Success { video_url, .. } => assert_eq!(video_url, video.url),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_download_failure_skips_later_stages() {
        let fakes = Fakes {
            fetcher: Arc::new(FakeFetcher::new().failing("HTTP 404 from example.com")),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/missing.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        let failure = outcome.failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::DownloadFailed);
        assert!(failure.reason.contains("404"));
        assert_eq!(job.stage(), JobStage::Failed);
        assert_eq!(fakes.generator.calls(), 0);
        assert_eq!(fakes.publisher.calls(), 0);
        assert!(fakes.fetcher.released().is_empty());

        match SubmitResponse::from(&outcome) {
            SubmitResponse::Error { message } => {
                assert!(message.starts_with("Failed to download video:"))
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_metadata_failure_still_releases_media() {
        let fakes = Fakes {
            generator: Arc::new(FakeGenerator::new().failing("no frames")),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::channel("+15550100"));

        let outcome = pipeline.run(&mut job).await;

        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::MetadataFailed));
        assert_eq!(fakes.publisher.calls(), 0);
        assert_eq!(fakes.fetcher.released().len(), 1);
        assert_eq!(fakes.notifier.results().len(), 1);
    }

    #[tokio::test]
    async fn test_quota_failure_reports_and_cleans_up() {
        let fakes = Fakes {
            publisher: Arc::new(FakePublisher::new().quota_exceeded()),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::channel("+15550101"));

        let outcome = pipeline.run(&mut job).await;

        let failure = outcome.failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::PublishFailed);
        assert!(failure.reason.to_lowercase().contains("quota"));
        assert!(outcome.video().is_none());
        assert_eq!(job.stage(), JobStage::Failed);
        assert_eq!(fakes.fetcher.released().len(), 1);

        let results = fakes.notifier.results();
        assert_eq!(results.len(), 1);
        assert!(!results[0].1.is_success());
    }

    #[tokio::test]
    async fn test_stage_timeout_is_a_stage_failure() {
        let fakes = Fakes {
            fetcher: Arc::new(FakeFetcher::new().with_delay(Duration::from_millis(500))),
            ..Fakes::default()
        };
        let config = WorkerConfig {
            download_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let pipeline = fakes.pipeline(&config);
        let mut job = Job::new("https://example.com/slow.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        let failure = outcome.failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::DownloadFailed);
        assert!(failure.is_timeout());
        assert_eq!(fakes.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_timeout_releases_media() {
        let fakes = Fakes {
            publisher: Arc::new(FakePublisher::new().with_delay(Duration::from_millis(500))),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        let failure = outcome.failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::PublishFailed);
        assert_eq!(failure.reason, "timeout");
        assert_eq!(fakes.fetcher.released().len(), 1);
    }

    #[tokio::test]
    async fn test_generator_panic_becomes_internal_failure() {
        let fakes = Fakes {
            generator: Arc::new(FakeGenerator::new().panicking()),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::Internal));
        assert_eq!(job.stage(), JobStage::Failed);
        assert_eq!(fakes.fetcher.released().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_job_notification_sequence() {
        let fakes = Fakes {
            publisher: Arc::new(FakePublisher::new().with_progress(vec![30, 60, 100])),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let origin = Origin::channel("+15550102");
        let mut job = Job::new("https://example.com/clip.mp4", origin.clone());

        let outcome = pipeline.run(&mut job).await;
        assert!(outcome.is_success());

        let events = fakes.notifier.events();
        assert_eq!(
            events,
            vec![
                NotifyEvent::Stage(origin.clone(), JobStage::Downloading),
                NotifyEvent::Stage(origin.clone(), JobStage::GeneratingMetadata),
                NotifyEvent::Stage(origin.clone(), JobStage::Uploading),
                NotifyEvent::Progress(origin.clone(), 30),
                NotifyEvent::Progress(origin.clone(), 60),
                NotifyEvent::Progress(origin.clone(), 100),
                NotifyEvent::Result(origin, outcome),
            ]
        );
    }

    #[tokio::test]
    async fn test_configured_visibility_is_applied() {
        let fakes = Fakes::default();
        let config = WorkerConfig {
            publish_visibility: Visibility::Unlisted,
            ..fast_config()
        };
        let pipeline = fakes.pipeline(&config);
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        assert_eq!(outcome.video().map(|v| v.visibility), Some(Visibility::Unlisted));
        assert_eq!(fakes.publisher.visibility_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_visibility_failure_keeps_success() {
        let fakes = Fakes {
            publisher: Arc::new(FakePublisher::new().failing_visibility()),
            ..Fakes::default()
        };
        let config = WorkerConfig {
            publish_visibility: Visibility::Public,
            ..fast_config()
        };
        let pipeline = fakes.pipeline(&config);
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        assert_eq!(outcome.video().map(|v| v.visibility), Some(Visibility::Private));
    }

    #[tokio::test]
    async fn test_visibility_has_its_own_time_budget() {
        let fakes = Fakes {
            publisher: Arc::new(
                FakePublisher::new().with_visibility_delay(Duration::from_millis(100)),
            ),
            ..Fakes::default()
        };
        let config = WorkerConfig {
            publish_visibility: Visibility::Unlisted,
            metadata_timeout: Duration::from_millis(20),
            visibility_timeout: Duration::from_secs(2),
            ..fast_config()
        };
        let pipeline = fakes.pipeline(&config);
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        assert_eq!(outcome.video().map(|v| v.visibility), Some(Visibility::Unlisted));
    }

    #[tokio::test]
    async fn test_slow_visibility_change_keeps_video_private() {
        let fakes = Fakes {
            publisher: Arc::new(
                FakePublisher::new().with_visibility_delay(Duration::from_millis(500)),
            ),
            ..Fakes::default()
        };
        let config = WorkerConfig {
            publish_visibility: Visibility::Public,
            visibility_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let pipeline = fakes.pipeline(&config);
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);

        let outcome = pipeline.run(&mut job).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.video().map(|v| v.visibility), Some(Visibility::Private));
    }

    #[tokio::test]
    async fn test_notifier_fault_before_download_fails_the_job() {
        let fakes = Fakes {
            notifier: Arc::new(
                RecordingNotifier::new().panicking_on("+15550666", JobStage::Downloading),
            ),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::channel("+15550666"));

        let outcome = AssertUnwindSafe(pipeline.run(&mut job))
            .catch_unwind()
            .await
            .expect("run must not unwind");

        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::Internal));
        assert_eq!(job.stage(), JobStage::Failed);
        assert_eq!(job.result(), Some(&outcome));
        assert!(fakes.fetcher.fetch_calls().is_empty());
        assert_eq!(fakes.notifier.results(), vec![(job.origin.clone(), outcome)]);
    }

    #[tokio::test]
    async fn test_notifier_fault_mid_job_still_releases_media() {
        let fakes = Fakes {
            notifier: Arc::new(
                RecordingNotifier::new().panicking_on("+15550667", JobStage::Uploading),
            ),
            ..Fakes::default()
        };
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::channel("+15550667"));

        let outcome = pipeline.run(&mut job).await;

        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::Internal));
        assert_eq!(job.stage(), JobStage::Failed);
        assert!(job.local_media().is_none());
        assert_eq!(fakes.publisher.calls(), 0);
        assert_eq!(fakes.fetcher.released().len(), 1);
    }

    #[tokio::test]
    async fn test_non_queued_job_is_rejected() {
        let fakes = Fakes::default();
        let pipeline = fakes.pipeline(&fast_config());
        let mut job = Job::new("https://example.com/clip.mp4", Origin::Synchronous);
        job.advance(JobStage::Downloading).unwrap();

        let outcome = pipeline.run(&mut job).await;

        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::Internal));
        assert!(fakes.fetcher.fetch_calls().is_empty());
        assert_eq!(job.stage(), JobStage::Downloading);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "unexpected fault: boom");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "unexpected fault");
    }
}
