//! Scripted adapter fakes for pipeline and scheduler tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use vidrelay_media::handle::unique_file_name;
use vidrelay_media::{
    FetchError, FetchResult, Fetcher, GenerationError, GenerationResult, LocalMediaHandle,
    MetadataGenerator,
};
use vidrelay_models::{JobId, JobOutcome, JobStage, Origin, PublishedId, VideoMetadata, Visibility};
use vidrelay_notify::Notifier;
use vidrelay_publish::{ProgressSender, PublishError, PublishResult, Publisher};

use crate::config::WorkerConfig;
use crate::pipeline::Pipeline;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Decrements the active counter when a call ends, however it ends.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Writes a small file per fetch and records releases.
pub struct FakeFetcher {
    work_dir: PathBuf,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    failure: Option<String>,
    panic_on: Option<String>,
    calls: Mutex<Vec<String>>,
    released: Mutex<Vec<PathBuf>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            delay: None,
            gate: None,
            failure: None,
            panic_on: None,
            calls: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fetches block until let through with [`FakeFetcher::open_gate`].
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` more blocked fetches proceed.
    pub fn open_gate(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Every fetch fails as unreachable with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Panic when the URL contains `pattern`.
    pub fn panicking_on(mut self, pattern: impl Into<String>) -> Self {
        self.panic_on = Some(pattern.into());
        self
    }

    /// URLs in the order fetches started.
    pub fn fetch_calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn released(&self) -> Vec<PathBuf> {
        lock(&self.released).clone()
    }

    /// Fetches running right now, including blocked ones.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<LocalMediaHandle> {
        lock(&self.calls).push(url.to_string());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(pattern) = &self.panic_on {
            if url.contains(pattern.as_str()) {
                panic!("fetcher fault for {}", url);
            }
        }
        if let Some(reason) = &self.failure {
            return Err(FetchError::unreachable(reason.clone()));
        }

        let path = self.work_dir.join(unique_file_name(".mp4"));
        tokio::fs::write(&path, b"fake video bytes").await?;
        Ok(LocalMediaHandle::new(path, url))
    }

    async fn release(&self, handle: LocalMediaHandle) {
        lock(&self.released).push(handle.path().to_path_buf());
        let _ = handle.remove().await;
    }
}

/// Returns fixed metadata.
#[derive(Default)]
pub struct FakeGenerator {
    failure: Option<String>,
    panic: bool,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataGenerator for FakeGenerator {
    async fn generate(&self, handle: &LocalMediaHandle) -> GenerationResult<VideoMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("generator fault");
        }
        if let Some(reason) = &self.failure {
            return Err(GenerationError::Failed(reason.clone()));
        }
        if !handle.path().exists() {
            return Err(GenerationError::MediaUnreadable("media already released".to_string()));
        }

        Ok(VideoMetadata::new(
            "Test video",
            format!("Shared from {}", handle.source_url()),
            vec!["test".to_string()],
        ))
    }
}

enum PublishFailure {
    Quota,
    Transport(String),
}

/// Reports scripted progress and returns sequential ids.
#[derive(Default)]
pub struct FakePublisher {
    progress: Vec<u8>,
    delay: Option<Duration>,
    visibility_delay: Option<Duration>,
    failure: Option<PublishFailure>,
    visibility_fails: bool,
    calls: AtomicUsize,
    visibility_calls: Mutex<Vec<(PublishedId, Visibility)>>,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: Vec<u8>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = Some(delay);
        self
    }

    pub fn quota_exceeded(mut self) -> Self {
        self.failure = Some(PublishFailure::Quota);
        self
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(PublishFailure::Transport(reason.into()));
        self
    }

    pub fn failing_visibility(mut self) -> Self {
        self.visibility_fails = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn visibility_calls(&self) -> Vec<(PublishedId, Visibility)> {
        lock(&self.visibility_calls).clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        _handle: &LocalMediaHandle,
        _metadata: &VideoMetadata,
        progress: ProgressSender,
    ) -> PublishResult<PublishedId> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        for percent in &self.progress {
            let _ = progress.send(*percent);
            tokio::task::yield_now().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.failure {
            Some(PublishFailure::Quota) => Err(PublishError::quota_exceeded("daily upload limit reached")),
            Some(PublishFailure::Transport(reason)) => Err(PublishError::transport(reason.clone())),
            None => Ok(PublishedId::new(format!("vid{}", n))),
        }
    }

    fn resolve_view_url(&self, id: &PublishedId) -> String {
        format!("https://videos.test/watch?v={}", id)
    }

    async fn set_visibility(&self, id: &PublishedId, visibility: Visibility) -> PublishResult<()> {
        lock(&self.visibility_calls).push((id.clone(), visibility));
        if let Some(delay) = self.visibility_delay {
            tokio::time::sleep(delay).await;
        }
        if self.visibility_fails {
            return Err(PublishError::auth_failure("insufficient scope"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Ack(Origin),
    Stage(Origin, JobStage),
    Progress(Origin, u8),
    Result(Origin, JobOutcome),
}

/// Records every notification in order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
    results_tx: Option<mpsc::UnboundedSender<(Origin, JobOutcome)>>,
    panic_on: Option<(String, JobStage)>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also stream terminal results, for waiting on asynchronous jobs.
    pub fn with_results() -> (Self, mpsc::UnboundedReceiver<(Origin, JobOutcome)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Self {
            results_tx: Some(tx),
            ..Self::default()
        };
        (notifier, rx)
    }

    /// Panic when `stage` is announced to `address`.
    pub fn panicking_on(mut self, address: impl Into<String>, stage: JobStage) -> Self {
        self.panic_on = Some((address.into(), stage));
        self
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        lock(&self.events).clone()
    }

    pub fn events_for(&self, address: &str) -> Vec<NotifyEvent> {
        self.events()
            .into_iter()
            .filter(|event| {
                let origin = match event {
                    NotifyEvent::Ack(o)
                    | NotifyEvent::Stage(o, _)
                    | NotifyEvent::Progress(o, _)
                    | NotifyEvent::Result(o, _) => o,
                };
                origin.reply_address() == Some(address)
            })
            .collect()
    }

    pub fn results(&self) -> Vec<(Origin, JobOutcome)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NotifyEvent::Result(origin, outcome) => Some((origin, outcome)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn acknowledge(&self, origin: &Origin) {
        lock(&self.events).push(NotifyEvent::Ack(origin.clone()));
    }

    async fn notify_stage(&self, _job: &JobId, origin: &Origin, stage: JobStage) {
        if let Some((address, panic_stage)) = &self.panic_on {
            if origin.reply_address() == Some(address.as_str()) && *panic_stage == stage {
                panic!("notifier fault at {}", stage);
            }
        }
        lock(&self.events).push(NotifyEvent::Stage(origin.clone(), stage));
    }

    async fn notify_progress(&self, _job: &JobId, origin: &Origin, percent: u8) {
        lock(&self.events).push(NotifyEvent::Progress(origin.clone(), percent));
    }

    async fn notify_result(&self, _job: &JobId, origin: &Origin, outcome: &JobOutcome) {
        lock(&self.events).push(NotifyEvent::Result(origin.clone(), outcome.clone()));
        if let Some(tx) = &self.results_tx {
            let _ = tx.send((origin.clone(), outcome.clone()));
        }
    }
}

/// One fake per adapter, shared with the pipeline built from them.
pub struct Fakes {
    pub fetcher: Arc<FakeFetcher>,
    pub generator: Arc<FakeGenerator>,
    pub publisher: Arc<FakePublisher>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            fetcher: Arc::new(FakeFetcher::new()),
            generator: Arc::new(FakeGenerator::new()),
            publisher: Arc::new(FakePublisher::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }
}

impl Fakes {
    pub fn pipeline(&self, config: &WorkerConfig) -> Pipeline {
        Pipeline::new(
            self.fetcher.clone(),
            self.generator.clone(),
            self.publisher.clone(),
            self.notifier.clone(),
            config,
        )
    }
}
