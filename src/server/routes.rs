//! HTTP route handlers for the vidchat API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::chat::{
    BackendError, ChatError, SessionId, SessionSnapshot, TranscriptView, TurnRequest,
};
use crate::transcript::VideoMetadata;

use super::state::AppState;

/// Response header carrying the session identifier of a chat turn.
pub const SESSION_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_turn))
        .route("/api/chat/{session_id}", delete(end_session))
        .route("/api/chat/{session_id}/history", get(session_history))
        .route("/api/transcript/{video_id}", get(transcript))
        .route("/api/video-info/{video_id}", get(video_info))
        .with_state(state)
}

/// Error body: `{ "error": { "kind", "message" } }`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable error kind.
    pub kind: &'static str,
    /// Message safe to show end users.
    pub message: String,
}

/// A [`ChatError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let err = &self.0;
        if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if matches!(err.backend_cause(), Some(BackendError::Timeout(_))) {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), "Request failed: {:?}", self.0);
        } else {
            tracing::warn!(kind = self.0.kind(), "Request rejected: {}", self.0);
        }

        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.0.kind(),
                message: self.0.public_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "vidchat",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.model_name,
    }))
}

/// Handle one chat turn; the reply is returned as plain text.
async fn chat_turn(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| ChatError::InputValidation(rejection.body_text()))?;

    let turn = state.chat.turn(request).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (SESSION_HEADER, turn.session_id.to_string()),
        ],
        turn.reply,
    )
        .into_response())
}

/// End a chat session.
async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&session_id)?;
    state.chat.end_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Conversation history of a live session.
async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let id = parse_session_id(&session_id)?;
    Ok(Json(state.chat.history(id).await?))
}

/// Normalized transcript of a video.
async fn transcript(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<TranscriptView>, ApiError> {
    Ok(Json(state.chat.transcript(&video_id).await?))
}

/// Public metadata of a video.
async fn video_info(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoMetadata>, ApiError> {
    Ok(Json(state.chat.video_info(&video_id).await?))
}

fn parse_session_id(raw: &str) -> Result<SessionId, ChatError> {
    raw.parse()
        .map_err(|_| ChatError::InputValidation(format!("Invalid session ID: {raw}")))
}
