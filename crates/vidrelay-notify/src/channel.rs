//! Message transports.

use async_trait::async_trait;
use tracing::info;

use crate::error::NotifyResult;

/// Delivers a text message to an address.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &'static str;

    async fn send(&self, to: &str, body: &str) -> NotifyResult<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl MessageChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, to: &str, body: &str) -> NotifyResult<()> {
        info!(to = %to, "Outgoing message: {}", body);
        Ok(())
    }
}
