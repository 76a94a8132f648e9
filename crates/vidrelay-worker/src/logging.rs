//! Per-job tracing context.
//!
//! A pipeline run executes inside one `job` span, so every event emitted by
//! the pipeline or its adapters carries the job id, the origin kind and the
//! stage the job is in.

use std::time::Duration;

use tracing::{error, field, info, info_span, Span};

use vidrelay_models::{Job, JobId, JobOutcome, JobStage, Origin};

/// Span covering one job from start to terminal stage.
pub fn job_span(job: &Job) -> Span {
    info_span!(
        "job",
        job_id = %job.id,
        origin = origin_kind(&job.origin),
        stage = field::Empty,
    )
}

/// Span for work done on a job outside the pipeline, such as a scheduler abort.
pub fn job_id_span(id: &JobId, origin: &Origin) -> Span {
    info_span!("job", job_id = %id, origin = origin_kind(origin))
}

pub fn origin_kind(origin: &Origin) -> &'static str {
    match origin {
        Origin::Synchronous => "sync",
        Origin::Channel { .. } => "channel",
    }
}

/// Record `stage` on the current job span.
pub fn enter_stage(stage: JobStage) {
    Span::current().record("stage", stage.as_str());
    info!("Entering stage {}", stage);
}

pub fn log_outcome(outcome: &JobOutcome, elapsed: Duration) {
    let elapsed_secs = elapsed.as_secs_f64();
    match outcome {
        JobOutcome::Published(video) => info!(
            video_id = %video.id,
            visibility = %video.visibility,
            elapsed_secs,
            "Published {}",
            video.url
        ),
        JobOutcome::Failed(failure) => error!(
            kind = failure.kind.as_str(),
            timeout = failure.is_timeout(),
            elapsed_secs,
            "{}",
            failure.user_message()
        ),
    }
}
