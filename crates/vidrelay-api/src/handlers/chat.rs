//! Synchronous submission from the web chat box.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use vidrelay_models::SubmitResponse;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// `POST /chat/send`: run the whole pipeline and answer with its result.
///
/// Pipeline failures are still `200`; the status is in the body.
pub async fn send_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(request) = payload.map_err(|_| ApiError::bad_request("Message is required"))?;
    let url = request.message.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }

    info!(url = %url, "Synchronous upload requested");
    let outcome = state.scheduler.run_sync(url).await;
    Ok(Json(SubmitResponse::from(&outcome)))
}
