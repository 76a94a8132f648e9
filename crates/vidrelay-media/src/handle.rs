//! Exclusively-owned handle to downloaded media.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// A media file on local storage, owned by exactly one job.
///
/// Not `Clone`; releasing consumes the handle.
#[derive(Debug)]
pub struct LocalMediaHandle {
    path: PathBuf,
    source_url: String,
}

impl LocalMediaHandle {
    pub fn new(path: impl Into<PathBuf>, source_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source_url: source_url.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URL the media was fetched from.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Delete the file. A file that is already gone counts as removed.
    pub async fn remove(self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Files of a download that has not finished yet.
///
/// Dropping the guard deletes them, which covers error returns as well as a
/// fetch future that is cancelled mid-write. [`PartialDownload::complete`]
/// hands the main file over to a [`LocalMediaHandle`]; side files such as
/// `<path>.part` are still removed.
#[derive(Debug)]
pub(crate) struct PartialDownload {
    path: Option<PathBuf>,
    side_files: Vec<PathBuf>,
}

impl PartialDownload {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            side_files: Vec::new(),
        }
    }

    /// Also remove `<path><suffix>` when the guard drops.
    pub(crate) fn with_side_file(mut self, suffix: &str) -> Self {
        if let Some(path) = &self.path {
            let mut name = path.clone().into_os_string();
            name.push(suffix);
            self.side_files.push(PathBuf::from(name));
        }
        self
    }

    pub(crate) fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Keep the main file and return a handle to it.
    pub(crate) fn complete(mut self, source_url: &str) -> LocalMediaHandle {
        let path = self.path.take().unwrap_or_default();
        LocalMediaHandle::new(path, source_url)
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        // Drop cannot await, and the removal must also run on cancellation.
        for path in self.path.iter().chain(self.side_files.iter()) {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed partial download"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Failed to remove partial download: {}", e),
            }
        }
    }
}

/// Per-job unique file name inside the work directory.
pub fn unique_file_name(extension: &str) -> String {
    format!("video_{}{}", Uuid::new_v4().simple(), extension)
}
