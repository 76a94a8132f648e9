//! Metadata generation contract and a file-based generator.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use vidrelay_models::VideoMetadata;

use crate::config::MediaConfig;
use crate::error::{GenerationError, GenerationResult};
use crate::handle::LocalMediaHandle;

/// Maximum title length accepted by the hosting platform.
pub const MAX_TITLE_CHARS: usize = 100;

/// Maximum description length accepted by the hosting platform.
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

const FALLBACK_TITLE: &str = "Untitled video";

/// Derives publishable metadata from downloaded media.
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn generate(&self, handle: &LocalMediaHandle) -> GenerationResult<VideoMetadata>;
}

/// Builds metadata from the media file and the URL it came from.
#[derive(Debug, Clone, Default)]
pub struct FileMetadataGenerator {
    default_tags: Vec<String>,
}

impl FileMetadataGenerator {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            default_tags: config.default_tags.clone(),
        }
    }
}

#[async_trait]
impl MetadataGenerator for FileMetadataGenerator {
    async fn generate(&self, handle: &LocalMediaHandle) -> GenerationResult<VideoMetadata> {
        let file = tokio::fs::metadata(handle.path())
            .await
            .map_err(|e| GenerationError::MediaUnreadable(e.to_string()))?;
        if file.len() == 0 {
            return Err(GenerationError::EmptyMedia);
        }

        let source = Url::parse(handle.source_url()).ok();
        let title = truncate_chars(&title_for(source.as_ref()), MAX_TITLE_CHARS);
        let description = truncate_chars(
            &format!(
                "{}\n\nOriginally shared from {}",
                title,
                handle.source_url()
            ),
            MAX_DESCRIPTION_CHARS,
        );

        let mut tags = self.default_tags.clone();
        if let Some(host) = source.as_ref().and_then(|u| u.host_str()) {
            let host = host.trim_start_matches("www.").to_string();
            if !tags.contains(&host) {
                tags.push(host);
            }
        }

        debug!(title = %title, tags = tags.len(), "Generated metadata");
        Ok(VideoMetadata::new(title, description, tags))
    }
}

/// Title from the last path segment of a direct link, else the source host.
fn title_for(source: Option<&Url>) -> String {
    let Some(url) = source else {
        return FALLBACK_TITLE.to_string();
    };

    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .and_then(humanize_file_name);

    match (from_path, url.host_str()) {
        (Some(title), _) => title,
        (None, Some(host)) => format!("Video from {}", host.trim_start_matches("www.")),
        (None, None) => FALLBACK_TITLE.to_string(),
    }
}

/// `my_holiday-clip.mp4` becomes `My holiday clip`. Segments without a file
/// extension are not treated as file names.
fn humanize_file_name(segment: &str) -> Option<String> {
    let (stem, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let words: Vec<&str> = stem
        .split(|c: char| c == '_' || c == '-' || c == '+' || c == '.')
        .flat_map(|part| part.split("%20"))
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() || !words.iter().any(|w| w.chars().any(char::is_alphabetic)) {
        return None;
    }

    let joined = words.join(" ");
    let mut chars = joined.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn handle_with(dir: &std::path::Path, bytes: &[u8], source: &str) -> LocalMediaHandle {
        let path = dir.join("video_test.mp4");
        tokio::fs::write(&path, bytes).await.unwrap();
        LocalMediaHandle::new(path, source)
    }

    #[test]
    fn test_humanize_file_name() {
        assert_eq!(
            humanize_file_name("my_holiday-clip.mp4").as_deref(),
            Some("My holiday clip")
        );
        assert_eq!(humanize_file_name("watch"), None);
        assert_eq!(humanize_file_name("12345.mp4"), None);
    }

    #[test]
    fn test_title_falls_back_to_host() {
        let url = Url::parse("https://www.youtube.com/watch?v=abc").unwrap();
        assert_eq!(title_for(Some(&url)), "Video from youtube.com");
        assert_eq!(title_for(None), "Untitled video");
    }

    #[tokio::test]
    async fn test_generate_from_direct_link() {
        let dir = tempfile::tempdir().unwrap();
        let handle = handle_with(dir.path(), b"data", "https://example.com/media/beach_day.mp4").await;

        let config = MediaConfig {
            default_tags: vec!["vidrelay".to_string()],
            ..MediaConfig::default()
        };
        let metadata = FileMetadataGenerator::new(&config)
            .generate(&handle)
            .await
            .unwrap();

        assert_eq!(metadata.title, "Beach day");
        assert!(metadata
            .description
            .contains("https://example.com/media/beach_day.mp4"));
        assert_eq!(metadata.tags, vec!["vidrelay", "example.com"]);
    }

    #[tokio::test]
    async fn test_empty_media_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let handle = handle_with(dir.path(), b"", "https://example.com/v.mp4").await;

        let err = FileMetadataGenerator::default()
            .generate(&handle)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyMedia));
    }

    #[tokio::test]
    async fn test_missing_media_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let handle = LocalMediaHandle::new(dir.path().join("nope.mp4"), "https://example.com");

        let err = FileMetadataGenerator::default()
            .generate(&handle)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MediaUnreadable(_)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(150);
        assert_eq!(truncate_chars(&long, MAX_TITLE_CHARS).chars().count(), 100);
    }
}
