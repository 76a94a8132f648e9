//! YouTube Data API v3 resumable upload.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use vidrelay_media::LocalMediaHandle;
use vidrelay_models::{PublishedId, VideoMetadata, Visibility};

use crate::config::YouTubeConfig;
use crate::error::{PublishError, PublishResult};
use crate::publisher::{ProgressSender, Publisher};

/// Error reasons the API uses for quota and rate limits.
const QUOTA_REASONS: [&str; 3] = ["quotaExceeded", "rateLimitExceeded", "uploadLimitExceeded"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    category_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    privacy_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    self_declared_made_for_kids: Option<bool>,
}

#[derive(Serialize)]
struct InsertRequest<'a> {
    snippet: Snippet<'a>,
    status: Status,
}

#[derive(Serialize)]
struct StatusUpdate<'a> {
    id: &'a str,
    status: Status,
}

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Uploads videos as private with resumable, chunked transfers.
pub struct YouTubePublisher {
    client: reqwest::Client,
    config: YouTubeConfig,
}

impl YouTubePublisher {
    pub fn new(config: YouTubeConfig) -> PublishResult<Self> {
        // 308 is the resumable protocol's "continue", not a redirect.
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PublishError::transport(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { client, config })
    }

    fn token(&self) -> PublishResult<&str> {
        self.config
            .access_token
            .as_deref()
            .ok_or_else(|| PublishError::auth_failure("YouTube access token not configured"))
    }

    /// Open a resumable session and return its upload URL.
    async fn start_session(
        &self,
        token: &str,
        metadata: &VideoMetadata,
        total: u64,
        content_type: &str,
    ) -> PublishResult<String> {
        let body = InsertRequest {
            snippet: Snippet {
                title: &metadata.title,
                description: &metadata.description,
                tags: &metadata.tags,
                category_id: &self.config.category_id,
            },
            status: Status {
                privacy_status: Visibility::Private.as_str(),
                self_declared_made_for_kids: Some(false),
            },
        };

        let response = self
            .client
            .post(format!("{}/youtube/v3/videos", self.config.upload_base))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Length", total)
            .header("X-Upload-Content-Type", content_type)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &text));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::transport("upload session missing Location header"))
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    async fn publish(
        &self,
        handle: &LocalMediaHandle,
        metadata: &VideoMetadata,
        progress: ProgressSender,
    ) -> PublishResult<PublishedId> {
        let token = self.token()?;
        let total = tokio::fs::metadata(handle.path()).await?.len();
        if total == 0 {
            return Err(PublishError::transport("media file is empty"));
        }

        info!("Starting upload for video: {}", metadata.title);
        let session = self
            .start_session(token, metadata, total, mime_for_path(handle.path()))
            .await?;

        let mut file = File::open(handle.path()).await?;
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut offset = 0u64;

        loop {
            file.seek(SeekFrom::Start(offset)).await?;
            let len = read_chunk(&mut file, &mut buf).await?;
            if len == 0 {
                return Err(PublishError::transport("upload finished without a video id"));
            }
            let end = offset + len as u64 - 1;

            let response = self
                .client
                .put(&session)
                .bearer_auth(token)
                .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, total))
                .body(buf[..len].to_vec())
                .send()
                .await
                .map_err(|e| PublishError::transport(e.to_string()))?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    let video: VideoResource = response
                        .json()
                        .await
                        .map_err(|e| PublishError::transport(format!("invalid upload response: {}", e)))?;
                    let _ = progress.send(100);
                    info!("Upload complete! Video ID: {}", video.id);
                    return Ok(PublishedId::new(video.id));
                }
                StatusCode::PERMANENT_REDIRECT => {
                    let next = committed_offset(response.headers()).unwrap_or(end + 1);
                    if next <= offset {
                        return Err(PublishError::transport("upload made no progress"));
                    }
                    offset = next;
                    let percent = upload_percent(offset, total);
                    debug!("Upload progress: {}%", percent);
                    let _ = progress.send(percent);
                }
                status => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(classify_error(status, &text));
                }
            }
        }
    }

    fn resolve_view_url(&self, id: &PublishedId) -> String {
        format!(
            "{}/watch?v={}",
            self.config.watch_base.trim_end_matches('/'),
            id
        )
    }

    async fn set_visibility(&self, id: &PublishedId, visibility: Visibility) -> PublishResult<()> {
        let token = self.token()?;
        let body = StatusUpdate {
            id: id.as_str(),
            status: Status {
                privacy_status: visibility.as_str(),
                self_declared_made_for_kids: None,
            },
        };

        let response = self
            .client
            .put(format!("{}/youtube/v3/videos", self.config.api_base))
            .query(&[("part", "status")])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &text));
        }

        info!("Updated video {} privacy to {}", id, visibility);
        Ok(())
    }
}

/// Map an API error response onto the publish error taxonomy.
fn classify_error(status: StatusCode, body: &str) -> PublishError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let is_quota = QUOTA_REASONS.iter().any(|r| body.contains(r));

    match status {
        StatusCode::UNAUTHORIZED => PublishError::AuthFailure(detail),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if is_quota => {
            PublishError::QuotaExceeded(detail)
        }
        StatusCode::FORBIDDEN => PublishError::AuthFailure(detail),
        _ => PublishError::Transport(format!("HTTP {}: {}", status.as_u16(), detail)),
    }
}

/// Next byte to send, from a `Range: bytes=0-N` header.
fn committed_offset(headers: &HeaderMap) -> Option<u64> {
    let range = headers.get(RANGE)?.to_str().ok()?;
    let last = range.rsplit('-').next()?.trim().parse::<u64>().ok()?;
    Some(last + 1)
}

fn upload_percent(sent: u64, total: u64) -> u8 {
    ((sent.saturating_mul(100)) / total.max(1)).min(100) as u8
}

async fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}
