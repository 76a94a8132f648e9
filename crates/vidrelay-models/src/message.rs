//! Payloads exchanged at the entry points.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JobOutcome;

/// Response returned to synchronous callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResponse {
    Success { message: String, video_url: String },
    Error { message: String },
}

impl SubmitResponse {
    pub fn error(message: impl Into<String>) -> Self {
        SubmitResponse::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmitResponse::Success { .. })
    }
}

impl From<&JobOutcome> for SubmitResponse {
    fn from(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Published(video) => SubmitResponse::Success {
                message: "Video uploaded successfully!".to_string(),
                video_url: video.url.clone(),
            },
            JobOutcome::Failed(failure) => SubmitResponse::error(failure.user_message()),
        }
    }
}

/// Message received from a messaging channel.
///
/// Only `body` is interpreted, as the source URL; attachments are carried
/// along but not processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InboundMessage {
    /// Sender address, without any transport prefix
    pub from: String,
    /// Message text
    pub body: String,
    /// First media attachment, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl InboundMessage {
    /// The URL to process, if the body holds anything.
    pub fn source_url(&self) -> Option<&str> {
        let body = self.body.trim();
        if body.is_empty() {
            None
        } else {
            Some(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, JobFailure, PublishedId, PublishedVideo, Visibility};

    #[test]
    fn test_success_response_shape() {
        let outcome = JobOutcome::Published(PublishedVideo {
            id: PublishedId::new("v1"),
            url: "https://host/watch?v=v1".to_string(),
            visibility: Visibility::Private,
        });
        let json = serde_json::to_value(SubmitResponse::from(&outcome)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["video_url"], "https://host/watch?v=v1");
    }

    #[test]
    fn test_error_response_shape() {
        let outcome = JobOutcome::Failed(JobFailure::new(
            FailureKind::DownloadFailed,
            "Invalid URL provided",
        ));
        let json = serde_json::to_value(SubmitResponse::from(&outcome)).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("download"));
        assert!(json.get("video_url").is_none());
    }

    #[test]
    fn test_inbound_source_url_trims() {
        let msg = InboundMessage {
            from: "+15550001".to_string(),
            body: "  https://example.com/v.mp4\n".to_string(),
            media_url: None,
        };
        assert_eq!(msg.source_url(), Some("https://example.com/v.mp4"));

        let empty = InboundMessage {
            body: "   ".to_string(),
            ..msg
        };
        assert_eq!(empty.source_url(), None);
    }
}
