//! Video relay job execution.
//!
//! This crate provides:
//! - The three-stage pipeline (download, metadata, publish) with per-stage
//!   timeouts, panic boundaries and guaranteed media cleanup
//! - A bounded FIFO scheduler for asynchronous jobs plus the synchronous path
//! - Per-job tracing spans and scheduler metrics
//! - Scripted adapter fakes behind the `testing` feature

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use pipeline::{Pipeline, StageTimeouts};
pub use scheduler::{JobScheduler, SchedulerStats};
