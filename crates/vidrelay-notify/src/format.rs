//! Chat message texts.

use vidrelay_models::{JobFailure, JobStage, PublishedVideo, Visibility};

/// Sent as soon as an inbound link is accepted.
pub const ACK_MESSAGE: &str = "🎥 Got your video link! Starting the upload process...";

const PROGRESS_BAR_LEN: usize = 10;

/// Announcement for a stage, if the stage is announced at all.
pub fn stage_message(stage: JobStage) -> Option<String> {
    let (emoji, label) = match stage {
        JobStage::Downloading => ("⬇️", "Downloading"),
        JobStage::GeneratingMetadata => ("✍️", "Generating metadata"),
        JobStage::Uploading => ("⬆️", "Uploading"),
        JobStage::Queued | JobStage::Succeeded | JobStage::Failed => return None,
    };
    Some(format!("{} {}...", emoji, label))
}

pub fn progress_message(percent: u8) -> String {
    let percent = percent.min(100);
    format!("⬆️ Uploading: {}%\n{}", percent, progress_bar(percent))
}

/// Text bar such as `[████░░░░░░]`.
pub fn progress_bar(percent: u8) -> String {
    let filled = PROGRESS_BAR_LEN * usize::from(percent.min(100)) / 100;
    format!(
        "[{}{}]",
        "█".repeat(filled),
        "░".repeat(PROGRESS_BAR_LEN - filled)
    )
}

pub fn complete_message(video: &PublishedVideo) -> String {
    let visibility_note = match video.visibility {
        Visibility::Private => {
            "👉 The video is currently set as private. You can change its privacy settings on the hosting platform."
                .to_string()
        }
        other => format!("👉 The video is {}.", other),
    };

    format!(
        "✅ Video Upload Complete!\n\n🎥 Watch your video here:\n{}\n\n{}",
        video.url, visibility_note
    )
}

pub fn error_message(failure: &JobFailure) -> String {
    format!(
        "❌ Error Processing Video\n\nDetails: {}\n\nPlease try again or contact support if the issue persists.",
        failure.user_message()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidrelay_models::{FailureKind, PublishedId};

    #[test]
    fn test_stage_messages() {
        assert_eq!(
            stage_message(JobStage::Downloading).as_deref(),
            Some("⬇️ Downloading...")
        );
        assert!(stage_message(JobStage::Queued).is_none());
        assert!(stage_message(JobStage::Failed).is_none());
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), "[░░░░░░░░░░]");
        assert_eq!(progress_bar(40), "[████░░░░░░]");
        assert_eq!(progress_bar(100), "[██████████]");
        assert_eq!(progress_bar(250), "[██████████]");
    }

    #[test]
    fn test_progress_message() {
        assert_eq!(progress_message(40), "⬆️ Uploading: 40%\n[████░░░░░░]");
    }

    #[test]
    fn test_complete_message_mentions_url_and_visibility() {
        let video = PublishedVideo {
            id: PublishedId::new("v1"),
            url: "https://host/watch?v=v1".to_string(),
            visibility: Visibility::Private,
        };
        let text = complete_message(&video);
        assert!(text.contains("https://host/watch?v=v1"));
        assert!(text.contains("private"));

        let public = PublishedVideo {
            visibility: Visibility::Public,
            ..video
        };
        assert!(complete_message(&public).contains("The video is public."));
    }

    #[test]
    fn test_error_message_is_distinct_from_progress() {
        let text = error_message(&JobFailure::new(FailureKind::PublishFailed, "Quota exceeded: daily"));
        assert!(text.starts_with("❌"));
        assert!(text.contains("Failed to upload video: Quota exceeded: daily"));
    }
}
