//! Handlers for voice submission, session reset and the voice catalog.

use crate::api::ApiError;
use crate::multipart::{boundary_from_content_type, find_part, parse_multipart};
use crate::pipeline::VoiceOutcome;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::Instrument;
use voxrelay_types::VoiceCatalog;

/// JSON body of a text-only submission.
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

/// Request body for `POST /api/reset`.
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub token: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Handler for `POST /api/voice-send`.
///
/// A `multipart/form-data` body carries a recording (`audio`, `token`,
/// optional `voice`); any other body is read as a JSON text submission.
pub async fn voice_send_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("voice_request", %request_id);

    async move {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if content_type.to_ascii_lowercase().contains("multipart/form-data") {
            handle_recording(&state, content_type, &body).await
        } else {
            handle_text(&state, &body).await
        }
    }
    .instrument(span)
    .await
}

async fn handle_recording(state: &AppState, content_type: &str, body: &[u8]) -> Result<Response, ApiError> {
    let boundary = boundary_from_content_type(content_type)
        .ok_or_else(|| ApiError::BadRequest("Missing boundary".to_string()))?;

    let parts = parse_multipart(body, &boundary);
    let audio = find_part(&parts, "audio").filter(|p| !p.data.is_empty());
    let token = find_part(&parts, "token")
        .map(|p| p.text().trim().to_string())
        .filter(|t| !t.is_empty());
    let (Some(audio), Some(token)) = (audio, token) else {
        return Err(ApiError::BadRequest("Missing audio or token".to_string()));
    };
    let voice = non_empty(find_part(&parts, "voice").map(|p| p.text()));

    tracing::info!(
        bytes = audio.data.len(),
        token_len = token.len(),
        voice = voice.as_deref().unwrap_or("default"),
        "voice submission received"
    );

    match state.pipeline.handle_audio(&token, audio, voice.as_deref()).await? {
        VoiceOutcome::NoSpeech => Ok(Json(json!({
            "error": "No speech detected",
            "transcript": ""
        }))
        .into_response()),
        VoiceOutcome::Replied(reply) => Ok(Json(reply).into_response()),
    }
}

async fn handle_text(state: &AppState, body: &[u8]) -> Result<Response, ApiError> {
    let request: TextRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?;

    let (Some(message), Some(token)) = (non_empty(request.message), non_empty(request.token)) else {
        return Err(ApiError::BadRequest("Missing message or token".to_string()));
    };
    let voice = non_empty(request.voice);

    tracing::info!(
        chars = message.chars().count(),
        token_len = token.len(),
        "text submission received"
    );

    let reply = state
        .pipeline
        .handle_text(&token, &message, voice.as_deref())
        .await?;
    Ok(Json(reply).into_response())
}

/// Handler for `POST /api/reset`.
pub async fn reset_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = non_empty(payload.token)
        .ok_or_else(|| ApiError::BadRequest("Missing token".to_string()))?;

    state.pipeline.reset_session(&token).await?;
    Ok(Json(json!({ "ok": true })))
}

/// Handler for `GET /api/voices`.
pub async fn voices_handler(Extension(state): Extension<Arc<AppState>>) -> Json<VoiceCatalog> {
    Json(state.pipeline.voice_catalog().await)
}
