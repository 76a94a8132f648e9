//! YouTube publisher configuration.

use std::time::Duration;

/// Resumable upload chunks must be a multiple of this size.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

#[derive(Clone)]
pub struct YouTubeConfig {
    /// OAuth bearer token with the youtube.upload scope
    pub access_token: Option<String>,
    /// Base URL for media uploads
    pub upload_base: String,
    /// Base URL for metadata calls
    pub api_base: String,
    /// Base URL for watch links
    pub watch_base: String,
    /// Upload chunk size in bytes
    pub chunk_size: usize,
    /// Video category (22 = People & Blogs)
    pub category_id: String,
    /// Timeout for a single HTTP request
    pub request_timeout: Duration,
}

// Keeps the token out of logs.
impl std::fmt::Debug for YouTubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeConfig")
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("upload_base", &self.upload_base)
            .field("api_base", &self.api_base)
            .field("watch_base", &self.watch_base)
            .field("chunk_size", &self.chunk_size)
            .field("category_id", &self.category_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            upload_base: "https://www.googleapis.com/upload".to_string(),
            api_base: "https://www.googleapis.com".to_string(),
            watch_base: "https://www.youtube.com".to_string(),
            chunk_size: 4 * CHUNK_GRANULARITY, // 1 MiB
            category_id: "22".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl YouTubeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let chunk_size = std::env::var("YOUTUBE_CHUNK_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .map(round_chunk_size)
            .unwrap_or(defaults.chunk_size);

        Self {
            access_token: std::env::var("YOUTUBE_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            upload_base: std::env::var("YOUTUBE_UPLOAD_BASE").unwrap_or(defaults.upload_base),
            api_base: std::env::var("YOUTUBE_API_BASE").unwrap_or(defaults.api_base),
            watch_base: std::env::var("YOUTUBE_WATCH_BASE").unwrap_or(defaults.watch_base),
            chunk_size,
            category_id: std::env::var("YOUTUBE_CATEGORY_ID").unwrap_or(defaults.category_id),
            request_timeout: Duration::from_secs(
                std::env::var("YOUTUBE_REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }

    /// Same config with every base URL pointing at `base`.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.upload_base = format!("{}/upload", base);
        self.api_base = base.to_string();
        self.watch_base = base.to_string();
        self
    }
}

/// Round down to the chunk granularity, never below one granule.
fn round_chunk_size(size: usize) -> usize {
    (size / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_chunk_size() {
        assert_eq!(round_chunk_size(1), CHUNK_GRANULARITY);
        assert_eq!(round_chunk_size(3 * CHUNK_GRANULARITY + 7), 3 * CHUNK_GRANULARITY);
    }

    #[test]
    fn test_debug_hides_token() {
        let config = YouTubeConfig {
            access_token: Some("secret-token".to_string()),
            ..YouTubeConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-token"));
    }
}
