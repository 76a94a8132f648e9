//! Shared data models for the VidRelay pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their stages and origins
//! - Failure taxonomy and terminal outcomes
//! - Video metadata and published video references
//! - Payloads exchanged at the entry points

pub mod failure;
pub mod job;
pub mod message;
pub mod video;

// Re-export common types
pub use failure::{FailureKind, JobFailure, JobOutcome};
pub use job::{Job, JobId, JobStage, Origin, StageError};
pub use message::{InboundMessage, SubmitResponse};
pub use video::{PublishedId, PublishedVideo, VideoMetadata, Visibility};
