//! Asynchronous submission from the WhatsApp gateway.

use axum::extract::State;
use axum::Form;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vidrelay_models::{InboundMessage, JobId, Origin};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Form fields posted by Twilio for an incoming message.
#[derive(Debug, Default, Deserialize)]
pub struct TwilioWebhook {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url: Option<String>,
}

impl From<TwilioWebhook> for InboundMessage {
    fn from(form: TwilioWebhook) -> Self {
        let from = form.from.trim();
        let has_media = form
            .num_media
            .as_deref()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .unwrap_or(0)
            > 0;

        InboundMessage {
            from: from.strip_prefix(WHATSAPP_PREFIX).unwrap_or(from).to_string(),
            body: form.body,
            media_url: form.media_url.filter(|_| has_media),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub job_id: JobId,
}

/// `POST /webhook`: queue the linked video and return at once.
///
/// Progress and the result reach the sender through the notifier.
pub async fn receive_message(
    State(state): State<AppState>,
    Form(form): Form<TwilioWebhook>,
) -> ApiResult<Json<WebhookResponse>> {
    let message = InboundMessage::from(form);
    let Some(url) = message.source_url().filter(|_| !message.from.is_empty()) else {
        warn!("Rejected webhook without sender or body");
        return Err(ApiError::bad_request("Invalid message data"));
    };
    if message.media_url.is_some() {
        info!(from = %message.from, "Ignoring media attachment; only the message text is used");
    }

    let job_id = state
        .scheduler
        .submit_async(url, Origin::channel(message.from.clone()))
        .await?;

    info!(job_id = %job_id, from = %message.from, "Queued upload from chat");
    Ok(Json(WebhookResponse {
        status: "success",
        job_id,
    }))
}
