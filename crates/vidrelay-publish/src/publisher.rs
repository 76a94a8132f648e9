//! Publisher contract.

use async_trait::async_trait;
use tokio::sync::mpsc;

use vidrelay_media::LocalMediaHandle;
use vidrelay_models::{PublishedId, VideoMetadata, Visibility};

use crate::error::PublishResult;

/// Sends upload progress (percent, 0-100). Sending never blocks; a closed
/// receiver is not an error for the publisher.
pub type ProgressSender = mpsc::UnboundedSender<u8>;

/// Receiving side of [`ProgressSender`].
pub type ProgressReceiver = mpsc::UnboundedReceiver<u8>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Uploads media to a hosting platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload the media with its metadata and return the platform id.
    ///
    /// The sender is dropped when the call returns, which ends the
    /// receiver's stream.
    async fn publish(
        &self,
        handle: &LocalMediaHandle,
        metadata: &VideoMetadata,
        progress: ProgressSender,
    ) -> PublishResult<PublishedId>;

    /// Canonical view URL for a published video.
    fn resolve_view_url(&self, id: &PublishedId) -> String;

    async fn set_visibility(&self, id: &PublishedId, visibility: Visibility) -> PublishResult<()>;
}
