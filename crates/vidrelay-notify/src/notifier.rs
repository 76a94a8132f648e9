//! Notifier contract and the chat-backed implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use vidrelay_models::{JobId, JobOutcome, JobStage, Origin};

use crate::channel::MessageChannel;
use crate::format;

/// Default progress step (percent) between chat updates.
pub const DEFAULT_PROGRESS_STEP: u8 = 25;

/// Reports job progress and results to the origin of a job.
///
/// Every call is best-effort: delivery problems are logged by the
/// implementation and never reach the pipeline. Synchronous origins
/// are ignored. `job` identifies the run, since one origin can have
/// several jobs in flight.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Confirm receipt of a submission.
    async fn acknowledge(&self, origin: &Origin);

    /// Announce a stage before it begins.
    async fn notify_stage(&self, job: &JobId, origin: &Origin, stage: JobStage);

    /// Upload progress, 0-100.
    async fn notify_progress(&self, job: &JobId, origin: &Origin, percent: u8);

    /// Terminal result, sent exactly once per job.
    async fn notify_result(&self, job: &JobId, origin: &Origin, outcome: &JobOutcome);
}

/// Notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn acknowledge(&self, _origin: &Origin) {}

    async fn notify_stage(&self, _job: &JobId, _origin: &Origin, _stage: JobStage) {}

    async fn notify_progress(&self, _job: &JobId, _origin: &Origin, _percent: u8) {}

    async fn notify_result(&self, _job: &JobId, _origin: &Origin, _outcome: &JobOutcome) {}
}

/// Sends formatted chat messages over a [`MessageChannel`].
pub struct ChannelNotifier<C> {
    channel: C,
    progress_step: u8,
    /// Last progress step reported, per job.
    reported: Mutex<HashMap<JobId, u8>>,
}

impl<C: MessageChannel> ChannelNotifier<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            progress_step: DEFAULT_PROGRESS_STEP,
            reported: Mutex::new(HashMap::new()),
        }
    }

    /// Override the progress step. Zero is treated as one.
    pub fn with_progress_step(mut self, step: u8) -> Self {
        self.progress_step = step.clamp(1, 100);
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    async fn deliver(&self, to: &str, body: &str) {
        match self.channel.send(to, body).await {
            Ok(()) => debug!(to = %to, channel = self.channel.name(), "Notification delivered"),
            Err(e) => warn!(
                to = %to,
                channel = self.channel.name(),
                "Failed to deliver notification: {}",
                e
            ),
        }
    }

    /// True when `percent` reaches a step that has not been reported yet.
    fn crosses_step(&self, job: &JobId, percent: u8) -> bool {
        let step = percent.min(100) / self.progress_step;
        let mut reported = self.reported.lock().unwrap_or_else(|e| e.into_inner());
        let last = reported.entry(job.clone()).or_insert(0);
        if step > *last {
            *last = step;
            true
        } else {
            false
        }
    }

    fn reset_progress(&self, job: &JobId) {
        self.reported
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job);
    }
}

#[async_trait]
impl<C: MessageChannel> Notifier for ChannelNotifier<C> {
    async fn acknowledge(&self, origin: &Origin) {
        if let Some(to) = origin.reply_address() {
            self.deliver(to, format::ACK_MESSAGE).await;
        }
    }

    async fn notify_stage(&self, job: &JobId, origin: &Origin, stage: JobStage) {
        let Some(to) = origin.reply_address() else {
            return;
        };
        if stage == JobStage::Uploading {
            self.reset_progress(job);
        }
        if let Some(text) = format::stage_message(stage) {
            self.deliver(to, &text).await;
        }
    }

    async fn notify_progress(&self, job: &JobId, origin: &Origin, percent: u8) {
        let Some(to) = origin.reply_address() else {
            return;
        };
        // 100% is covered by the completion message.
        if percent >= 100 || !self.crosses_step(job, percent) {
            return;
        }
        self.deliver(to, &format::progress_message(percent)).await;
    }

    async fn notify_result(&self, job: &JobId, origin: &Origin, outcome: &JobOutcome) {
        let Some(to) = origin.reply_address() else {
            return;
        };
        self.reset_progress(job);

        let text = match outcome {
            JobOutcome::Published(video) => format::complete_message(video),
            JobOutcome::Failed(failure) => format::error_message(failure),
        };
        self.deliver(to, &text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NotifyError, NotifyResult};
    use vidrelay_models::{FailureKind, JobFailure};

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingChannel {
        fn bodies(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, body)| body.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MessageChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, to: &str, body: &str) -> NotifyResult<()> {
            if self.fail {
                return Err(NotifyError::transport("connection refused"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_synchronous_origin_is_silent() {
        let notifier = ChannelNotifier::new(RecordingChannel::default());
        let origin = Origin::Synchronous;
        let job = JobId::new();

        notifier.acknowledge(&origin).await;
        notifier.notify_stage(&job, &origin, JobStage::Downloading).await;
        notifier.notify_progress(&job, &origin, 50).await;
        notifier
            .notify_result(&job, &origin, &JobOutcome::Failed(JobFailure::internal("x")))
            .await;

        assert!(notifier.channel().bodies().is_empty());
    }

    #[tokio::test]
    async fn test_channel_origin_receives_messages_in_order() {
        let notifier = ChannelNotifier::new(RecordingChannel::default());
        let origin = Origin::channel("+15550001");
        let job = JobId::new();

        notifier.acknowledge(&origin).await;
        notifier.notify_stage(&job, &origin, JobStage::Downloading).await;
        notifier
            .notify_result(
                &job,
                &origin,
                &JobOutcome::Failed(JobFailure::new(FailureKind::DownloadFailed, "HTTP 404")),
            )
            .await;

        let bodies = notifier.channel().bodies();
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0], format::ACK_MESSAGE);
        assert_eq!(bodies[1], "⬇️ Downloading...");
        assert!(bodies[2].contains("Failed to download video: HTTP 404"));

        let sent = notifier.channel().sent.lock().unwrap();
        assert!(sent.iter().all(|(to, _)| to == "+15550001"));
    }

    #[tokio::test]
    async fn test_progress_is_throttled_to_steps() {
        let notifier = ChannelNotifier::new(RecordingChannel::default());
        let origin = Origin::channel("+15550002");
        let job = JobId::new();

        notifier.notify_stage(&job, &origin, JobStage::Uploading).await;
        for percent in [3, 10, 26, 30, 49, 51, 80, 100] {
            notifier.notify_progress(&job, &origin, percent).await;
        }

        let bodies = notifier.channel().bodies();
        assert_eq!(
            bodies,
            vec![
                "⬆️ Uploading...".to_string(),
                format::progress_message(26),
                format::progress_message(51),
                format::progress_message(80),
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_stage_resets_progress() {
        let notifier = ChannelNotifier::new(RecordingChannel::default()).with_progress_step(50);
        let origin = Origin::channel("+15550003");
        let job = JobId::new();

        notifier.notify_progress(&job, &origin, 60).await;
        notifier.notify_stage(&job, &origin, JobStage::Uploading).await;
        notifier.notify_progress(&job, &origin, 60).await;

        let progress: Vec<_> = notifier
            .channel()
            .bodies()
            .into_iter()
            .filter(|b| b.contains('%'))
            .collect();
        assert_eq!(progress.len(), 2);
    }

    #[tokio::test]
    async fn test_jobs_from_one_address_are_throttled_separately() {
        let notifier = ChannelNotifier::new(RecordingChannel::default());
        let origin = Origin::channel("+15550005");
        let first = JobId::new();
        let second = JobId::new();

        notifier.notify_stage(&first, &origin, JobStage::Uploading).await;
        notifier.notify_progress(&first, &origin, 55).await;
        notifier.notify_stage(&second, &origin, JobStage::Uploading).await;
        notifier.notify_progress(&second, &origin, 30).await;
        notifier
            .notify_result(&second, &origin, &JobOutcome::Failed(JobFailure::internal("x")))
            .await;
        // The first job is still past 50%, so 60% is not a new step.
        notifier.notify_progress(&first, &origin, 60).await;
        notifier.notify_progress(&first, &origin, 80).await;

        let progress: Vec<_> = notifier
            .channel()
            .bodies()
            .into_iter()
            .filter(|b| b.contains('%'))
            .collect();
        assert_eq!(
            progress,
            vec![
                format::progress_message(55),
                format::progress_message(30),
                format::progress_message(80),
            ]
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = ChannelNotifier::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let origin = Origin::channel("+15550004");
        let job = JobId::new();

        notifier.acknowledge(&origin).await;
        notifier.notify_stage(&job, &origin, JobStage::Uploading).await;
        notifier
            .notify_result(&job, &origin, &JobOutcome::Failed(JobFailure::internal("boom")))
            .await;
    }
}
