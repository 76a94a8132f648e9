//! Progress and result notifications.
//!
//! This crate provides:
//! - The `Notifier` contract consumed by the pipeline (best-effort, infallible)
//! - Chat message formatting for stages, upload progress and results
//! - A WhatsApp transport through the Twilio Messages API

pub mod channel;
pub mod error;
pub mod format;
pub mod notifier;
pub mod twilio;

pub use channel::{LogChannel, MessageChannel};
pub use error::{NotifyError, NotifyResult};
pub use notifier::{ChannelNotifier, Notifier, NoopNotifier};
pub use twilio::{TwilioConfig, TwilioWhatsApp};
