//! Video publishing.
//!
//! This crate provides:
//! - The `Publisher` contract with non-blocking progress reporting
//! - A YouTube Data API v3 resumable uploader

pub mod config;
pub mod error;
pub mod publisher;
pub mod youtube;

pub use config::YouTubeConfig;
pub use error::{PublishError, PublishResult};
pub use publisher::{progress_channel, ProgressReceiver, ProgressSender, Publisher};
pub use youtube::YouTubePublisher;
