//! Job scheduler.
//!
//! Asynchronous jobs wait in a FIFO queue and run on spawned tasks, at most
//! `max_concurrent_jobs` at a time. Synchronous jobs run on the caller's task.
//! Both paths share the in-flight registry, so no job id executes twice.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use vidrelay_models::{FailureKind, Job, JobFailure, JobId, JobOutcome, Origin};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging;
use crate::metrics;
use crate::pipeline::{panic_message, Pipeline};

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Accepted but not started
    pub queued: usize,
    /// Currently executing, both paths
    pub in_flight: usize,
    pub max_concurrent: usize,
}

#[derive(Default)]
struct Registry {
    queued: AtomicUsize,
    in_flight: Mutex<HashSet<JobId>>,
}

impl Registry {
    /// Claim `id` for execution; false if it is already running.
    fn begin(&self, id: &JobId) -> bool {
        let mut running = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let inserted = running.insert(id.clone());
        metrics::set_jobs_in_flight(running.len());
        inserted
    }

    fn finish(&self, id: &JobId) {
        let mut running = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(id);
        metrics::set_jobs_in_flight(running.len());
    }

    fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn enqueued(&self) {
        let queued = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_queue_length(queued);
    }

    fn dequeued(&self) {
        let queued = self.queued.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_queue_length(queued);
    }
}

/// Bounded FIFO scheduler in front of a [`Pipeline`].
pub struct JobScheduler {
    pipeline: Arc<Pipeline>,
    config: WorkerConfig,
    registry: Arc<Registry>,
    permits: Arc<Semaphore>,
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    abort: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    /// Start the dispatcher. Must be called within a Tokio runtime.
    pub fn start(pipeline: Arc<Pipeline>, config: WorkerConfig) -> WorkerResult<Self> {
        if config.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error(
                "max_concurrent_jobs must be at least 1",
            ));
        }

        let registry = Arc::new(Registry::default());
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (abort, abort_rx) = watch::channel(false);

        info!(
            "Starting job scheduler with {} max concurrent jobs",
            config.max_concurrent_jobs
        );

        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&pipeline),
            Arc::clone(&registry),
            Arc::clone(&permits),
            queue_rx,
            abort_rx,
        ));

        Ok(Self {
            pipeline,
            config,
            registry,
            permits,
            queue: Mutex::new(Some(queue_tx)),
            abort,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Enqueue a job and return its id without waiting for it.
    ///
    /// The origin is acknowledged before the job can start, so the
    /// acknowledgment always precedes stage notifications.
    pub async fn submit_async(
        &self,
        source_url: impl Into<String>,
        origin: Origin,
    ) -> WorkerResult<JobId> {
        if self.is_closed() {
            return Err(WorkerError::SchedulerClosed);
        }
        if !origin.is_channel() {
            warn!("Asynchronous job without a reply channel; its result is only logged");
        }

        let job = Job::new(source_url, origin);
        let id = job.id.clone();
        let origin = job.origin.clone();

        self.pipeline.notifier().acknowledge(&origin).await;

        let sent = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            match queue.as_ref() {
                Some(tx) => {
                    self.registry.enqueued();
                    if tx.send(job).is_err() {
                        self.registry.dequeued();
                        false
                    } else {
                        true
                    }
                }
                None => false,
            }
        };

        if !sent {
            // Closed between the check and the send; the sender was acknowledged.
            let outcome = JobOutcome::Failed(JobFailure::internal("service is shutting down"));
            self.pipeline.notifier().notify_result(&id, &origin, &outcome).await;
            return Err(WorkerError::SchedulerClosed);
        }

        metrics::record_job_submitted("async");
        debug!(job_id = %id, "Job queued");
        Ok(id)
    }

    /// Run a synchronous job on the calling task and return its outcome.
    pub async fn run_sync(&self, source_url: impl Into<String>) -> JobOutcome {
        let mut job = Job::new(source_url, Origin::Synchronous);
        metrics::record_job_submitted("sync");

        if !self.registry.begin(&job.id) {
            let err = WorkerError::AlreadyRunning(job.id.clone());
            return JobOutcome::Failed(JobFailure::internal(err.to_string()));
        }

        let id = job.id.clone();
        let outcome = match AssertUnwindSafe(self.pipeline.run(&mut job))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let failure = JobFailure::internal(panic_message(panic.as_ref()));
                error!(job_id = %id, "Job aborted: {}", failure.reason);
                metrics::record_job_failed(failure.kind);
                JobOutcome::Failed(failure)
            }
        };

        self.registry.finish(&id);
        outcome
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued: self.registry.queued.load(Ordering::SeqCst),
            in_flight: self.registry.in_flight(),
            max_concurrent: self.config.max_concurrent_jobs,
        }
    }

    /// True once [`JobScheduler::shutdown`] has been called.
    pub fn is_closed(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Stop intake, run what is already queued and wait for running jobs.
    ///
    /// Gives up after `shutdown_timeout`; jobs still waiting in the queue at
    /// that point are reported failed instead of being dropped.
    pub async fn shutdown(&self) {
        let sender = self.queue.lock().unwrap_or_else(|e| e.into_inner()).take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        info!("Scheduler shutting down, draining queued jobs...");
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let all_permits = self.config.max_concurrent_jobs as u32;

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            if let Some(handle) = dispatcher {
                if let Err(e) = handle.await {
                    error!("Dispatcher task failed: {}", e);
                }
            }
            let _ = self.permits.acquire_many(all_permits).await;
        })
        .await;

        match drained {
            Ok(()) => info!("Scheduler stopped"),
            Err(_) => {
                warn!(
                    "Shutdown timed out after {:?} with {} queued and {} running",
                    self.config.shutdown_timeout,
                    self.registry.queued.load(Ordering::SeqCst),
                    self.registry.in_flight()
                );
                let _ = self.abort.send(true);
            }
        }
    }
}

/// Hands queued jobs to tasks as permits free up, in arrival order.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    registry: Arc<Registry>,
    permits: Arc<Semaphore>,
    mut queue: mpsc::UnboundedReceiver<Job>,
    mut abort: watch::Receiver<bool>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = abort.changed() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => return,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = abort.changed() => {
                abandon(&pipeline, &registry, job).await;
                break;
            }
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    abandon(&pipeline, &registry, job).await;
                    break;
                }
            },
        };

        registry.dequeued();
        if !registry.begin(&job.id) {
            error!("{}", WorkerError::AlreadyRunning(job.id.clone()));
            continue;
        }

        tokio::spawn(execute(
            Arc::clone(&pipeline),
            Arc::clone(&registry),
            job,
            permit,
        ));
    }

    queue.close();
    while let Ok(job) = queue.try_recv() {
        abandon(&pipeline, &registry, job).await;
    }
}

/// Per-job execution boundary.
async fn execute(
    pipeline: Arc<Pipeline>,
    registry: Arc<Registry>,
    mut job: Job,
    _permit: OwnedSemaphorePermit,
) {
    let id = job.id.clone();
    let origin = job.origin.clone();

    let result = AssertUnwindSafe(pipeline.run(&mut job)).catch_unwind().await;

    if let Err(panic) = result {
        let span = logging::job_id_span(&id, &origin);
        let failure = JobFailure::internal(panic_message(panic.as_ref()));
        span.in_scope(|| error!("Job aborted: {}", failure.reason));
        metrics::record_job_failed(failure.kind);

        let outcome = JobOutcome::Failed(failure);
        let report = AssertUnwindSafe(pipeline.notifier().notify_result(&id, &origin, &outcome))
            .catch_unwind()
            .instrument(span.clone())
            .await;
        if report.is_err() {
            span.in_scope(|| error!("Failed to report aborted job"));
        }
    }

    registry.finish(&id);
}

/// Report a job that will never run.
async fn abandon(pipeline: &Pipeline, registry: &Registry, job: Job) {
    registry.dequeued();
    let span = logging::job_id_span(&job.id, &job.origin);
    span.in_scope(|| warn!("Dropping queued job at shutdown"));
    metrics::record_job_failed(FailureKind::Internal);
    let outcome = JobOutcome::Failed(JobFailure::internal("service is shutting down"));
    pipeline
        .notifier()
        .notify_result(&job.id, &job.origin, &outcome)
        .instrument(span)
        .await;
}
