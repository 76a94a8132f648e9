//! Media adapter configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the fetchers and the metadata generator.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Directory downloaded media is written to
    pub work_dir: PathBuf,
    /// User agent for direct downloads
    pub user_agent: String,
    /// TCP connect timeout for direct downloads
    pub connect_timeout: Duration,
    /// yt-dlp executable name or path
    pub ytdlp_binary: String,
    /// Tags added to every generated metadata set
    pub default_tags: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/vidrelay"),
            user_agent: format!("vidrelay/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(15),
            ytdlp_binary: "yt-dlp".to_string(),
            default_tags: Vec::new(),
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("MEDIA_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            user_agent: std::env::var("MEDIA_USER_AGENT").unwrap_or(defaults.user_agent),
            connect_timeout: Duration::from_secs(
                std::env::var("MEDIA_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            ytdlp_binary: std::env::var("YTDLP_BINARY").unwrap_or(defaults.ytdlp_binary),
            default_tags: std::env::var("METADATA_DEFAULT_TAGS")
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Same config rooted at a different work directory.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}
