//! Source URL classification.

use url::Url;

use crate::error::{FetchError, FetchResult};

/// Kind of hosting provider behind a source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// youtube.com / youtu.be, fetched with yt-dlp
    YouTube,
    /// Google Drive file share
    GoogleDrive { file_id: String },
    /// Anything else, fetched as a plain HTTP download
    Direct,
}

impl MediaSource {
    /// Parse and classify a raw URL.
    pub fn classify(raw: &str) -> FetchResult<(Url, MediaSource)> {
        let url = Url::parse(raw.trim())
            .map_err(|_| FetchError::invalid_url("Invalid URL provided"))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(FetchError::unsupported(format!(
                    "unsupported URL scheme '{}'",
                    other
                )))
            }
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_ascii_lowercase(),
            _ => return Err(FetchError::invalid_url("Invalid URL provided")),
        };

        let source = if is_youtube_host(&host) {
            MediaSource::YouTube
        } else if host == "drive.google.com" {
            let file_id = drive_file_id(&url)
                .ok_or_else(|| FetchError::invalid_url("Google Drive file id not found in URL"))?;
            MediaSource::GoogleDrive { file_id }
        } else {
            MediaSource::Direct
        };

        Ok((url, source))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::YouTube => "youtube",
            MediaSource::GoogleDrive { .. } => "google_drive",
            MediaSource::Direct => "direct",
        }
    }
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtu.be"
        || host.ends_with(".youtu.be")
}

/// Extract the file id from `?id=<id>` or `/d/<id>/...` style links.
fn drive_file_id(url: &Url) -> Option<String> {
    if let Some((_, id)) = url.query_pairs().find(|(k, _)| k == "id") {
        if !id.is_empty() {
            return Some(id.into_owned());
        }
    }

    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0] == "d" && !pair[1].is_empty())
        .map(|pair| pair[1].to_string())
}

/// Direct-download URL for a Google Drive file.
pub fn drive_download_url(file_id: &str) -> FetchResult<Url> {
    let mut url = Url::parse("https://drive.google.com/uc")
        .map_err(|e| FetchError::invalid_url(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("id", file_id)
        .append_pair("export", "download");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_url_is_invalid() {
        let err = MediaSource::classify("not a url").unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_non_http_scheme_is_unsupported() {
        let err = MediaSource::classify("ftp://example.com/video.mp4").unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedSource(_)));
    }

    #[test]
    fn test_youtube_hosts() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/shorts/abc",
        ] {
            let (_, source) = MediaSource::classify(url).unwrap();
            assert_eq!(source, MediaSource::YouTube, "{}", url);
        }
    }

    #[test]
    fn test_drive_id_from_query() {
        let (_, source) =
            MediaSource::classify("https://drive.google.com/open?id=FILE123").unwrap();
        assert_eq!(
            source,
            MediaSource::GoogleDrive {
                file_id: "FILE123".to_string()
            }
        );
    }

    #[test]
    fn test_drive_id_from_path() {
        let (_, source) =
            MediaSource::classify("https://drive.google.com/file/d/FILE456/view?usp=sharing")
                .unwrap();
        assert_eq!(
            source,
            MediaSource::GoogleDrive {
                file_id: "FILE456".to_string()
            }
        );
    }

    #[test]
    fn test_drive_without_id_is_invalid() {
        let err = MediaSource::classify("https://drive.google.com/drive/my-drive").unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_everything_else_is_direct() {
        let (url, source) = MediaSource::classify("https://example.com/video.mp4").unwrap();
        assert_eq!(source, MediaSource::Direct);
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_drive_download_url() {
        let url = drive_download_url("FILE123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://drive.google.com/uc?id=FILE123&export=download"
        );
    }
}
