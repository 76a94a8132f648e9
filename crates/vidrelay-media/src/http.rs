//! Direct HTTP and Google Drive downloads.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncWriteExt;
use tracing::info;
use url::Url;

use crate::config::MediaConfig;
use crate::error::{FetchError, FetchResult};
use crate::fetcher::Fetcher;
use crate::handle::{unique_file_name, LocalMediaHandle, PartialDownload};
use crate::source::{drive_download_url, MediaSource};

/// Streams a response body into the work directory.
pub struct HttpFetcher {
    client: reqwest::Client,
    work_dir: PathBuf,
}

impl HttpFetcher {
    pub fn new(config: &MediaConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FetchError::unsupported(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            work_dir: config.work_dir.clone(),
        })
    }

    async fn download(&self, url: Url, source_url: &str) -> FetchResult<LocalMediaHandle> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::unreachable(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url.host_str().unwrap_or("source")
            )));
        }

        let extension = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(extension_for_mime)
            .unwrap_or(".mp4");

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let partial = PartialDownload::new(self.work_dir.join(unique_file_name(extension)));
        // Created before the first await so a cancelled fetch never leaves a file behind.
        let file = std::fs::File::create(partial.path())?;

        let bytes = write_body(response, tokio::fs::File::from_std(file)).await?;
        info!(
            output = %partial.path().display(),
            size_mb = bytes as f64 / (1024.0 * 1024.0),
            "Downloaded video successfully"
        );
        Ok(partial.complete(source_url))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<LocalMediaHandle> {
        let (parsed, source) = MediaSource::classify(url)?;
        let target = match source {
            MediaSource::Direct => parsed,
            MediaSource::GoogleDrive { file_id } => drive_download_url(&file_id)?,
            MediaSource::YouTube => {
                return Err(FetchError::unsupported(
                    "YouTube links cannot be downloaded directly",
                ))
            }
        };

        info!("Downloading video from {}", target);
        self.download(target, url).await
    }
}

async fn write_body(mut response: reqwest::Response, mut file: tokio::fs::File) -> FetchResult<u64> {
    let mut written = 0u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::unreachable(format!("download interrupted: {}", e)))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// File extension for a video MIME type, `.mp4` when unknown.
pub fn extension_for_mime(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "video/mp4" => ".mp4",
        "video/quicktime" => ".mov",
        "video/x-msvideo" => ".avi",
        "video/x-matroska" => ".mkv",
        "video/webm" => ".webm",
        _ => ".mp4",
    }
}
