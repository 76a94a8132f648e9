//! Scheduler and pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API process installs the
//! Prometheus recorder that renders them.

use metrics::{counter, gauge, histogram};

use vidrelay_models::{FailureKind, JobStage};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "vidrelay_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vidrelay_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vidrelay_jobs_failed_total";
    pub const QUEUE_LENGTH: &str = "vidrelay_queue_length";
    pub const JOBS_IN_FLIGHT: &str = "vidrelay_jobs_in_flight";
    pub const STAGE_DURATION_SECONDS: &str = "vidrelay_stage_duration_seconds";
}

/// Record a submission; `mode` is "sync" or "async".
pub fn record_job_submitted(mode: &str) {
    let labels = [("mode", mode.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed(kind: FailureKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn set_queue_length(length: usize) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn record_stage_duration(stage: JobStage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
