//! Video download using yt-dlp.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{FetchError, FetchResult};
use crate::fetcher::Fetcher;
use crate::handle::{unique_file_name, LocalMediaHandle, PartialDownload};
use crate::source::MediaSource;

/// Progressive mp4 first, then anything mp4, then best available.
const FORMAT_SELECTOR: &str = "best[ext=mp4][vcodec!=none][acodec!=none]/best[ext=mp4]/best";

/// Downloads platform-hosted videos by shelling out to yt-dlp.
pub struct YtDlpFetcher {
    binary: String,
    work_dir: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            binary: config.ytdlp_binary.clone(),
            work_dir: config.work_dir.clone(),
        }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<LocalMediaHandle> {
        let (parsed, _) = MediaSource::classify(url)?;

        which::which(&self.binary)
            .map_err(|_| FetchError::unsupported(format!("{} not found in PATH", self.binary)))?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        // yt-dlp writes `<path>.part` while downloading and `<path>.ytdl` for resume state.
        let partial = PartialDownload::new(self.work_dir.join(unique_file_name(".mp4")))
            .with_side_file(".part")
            .with_side_file(".ytdl");

        info!(
            "Downloading video from {} to {}",
            parsed,
            partial.path().display()
        );

        let output = Command::new(&self.binary)
            .arg("--no-playlist")
            .arg("--no-progress")
            .args(["-f", FORMAT_SELECTOR])
            .args(["--merge-output-format", "mp4"])
            .arg("-o")
            .arg(partial.path())
            .arg(parsed.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);

            let error_msg = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("Unknown error");
            return Err(FetchError::unreachable(format!("yt-dlp failed: {}", error_msg)));
        }

        if !partial.path().exists() {
            return Err(FetchError::unreachable("Output file not created"));
        }

        let file_size = tokio::fs::metadata(partial.path()).await?.len();
        info!(
            output = %partial.path().display(),
            size_mb = file_size as f64 / (1024.0 * 1024.0),
            "Downloaded video successfully"
        );

        Ok(partial.complete(url))
    }
}
