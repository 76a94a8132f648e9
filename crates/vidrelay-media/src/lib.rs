//! Media retrieval and metadata generation.
//!
//! This crate provides:
//! - The `Fetcher` contract and `LocalMediaHandle` ownership model
//! - Direct HTTP / Google Drive downloads via reqwest
//! - YouTube downloads via yt-dlp
//! - The `MetadataGenerator` contract and a file-based generator

pub mod config;
pub mod error;
pub mod fetcher;
pub mod handle;
pub mod http;
pub mod metadata;
pub mod source;
pub mod ytdlp;

pub use config::MediaConfig;
pub use error::{FetchError, FetchResult, GenerationError, GenerationResult};
pub use fetcher::{Fetcher, MediaFetcher};
pub use handle::LocalMediaHandle;
pub use http::HttpFetcher;
pub use metadata::{FileMetadataGenerator, MetadataGenerator};
pub use source::MediaSource;
pub use ytdlp::YtDlpFetcher;
