//! Fetcher contract and the routing fetcher used in production.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::error::FetchResult;
use crate::handle::LocalMediaHandle;
use crate::http::HttpFetcher;
use crate::source::MediaSource;
use crate::ytdlp::YtDlpFetcher;

/// Retrieves media for a URL onto local storage.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download the media behind `url` and return an owned handle to it.
    ///
    /// Implementations must not leave partial files behind on error.
    async fn fetch(&self, url: &str) -> FetchResult<LocalMediaHandle>;

    /// Delete the local media. Best-effort: failures are logged.
    async fn release(&self, handle: LocalMediaHandle) {
        let path = handle.path().display().to_string();
        match handle.remove().await {
            Ok(()) => info!(path = %path, "Cleaned up local media"),
            Err(e) => warn!(path = %path, "Failed to clean up local media: {}", e),
        }
    }
}

/// Dispatches to yt-dlp for YouTube links and to plain HTTP otherwise.
pub struct MediaFetcher {
    http: HttpFetcher,
    ytdlp: YtDlpFetcher,
}

impl MediaFetcher {
    pub fn new(config: &MediaConfig) -> FetchResult<Self> {
        Ok(Self {
            http: HttpFetcher::new(config)?,
            ytdlp: YtDlpFetcher::new(config),
        })
    }
}

#[async_trait]
impl Fetcher for MediaFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<LocalMediaHandle> {
        let (_, source) = MediaSource::classify(url)?;
        debug!(source = source.as_str(), "Routing download");

        match source {
            MediaSource::YouTube => self.ytdlp.fetch(url).await,
            MediaSource::GoogleDrive { .. } | MediaSource::Direct => self.http.fetch(url).await,
        }
    }
}
