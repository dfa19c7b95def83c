//! Notes API: the wrapped key record and the encrypted event log
//!
//!   GET  /api/key      - 200 WrappedKey | 404
//!   POST /api/key      - 201 | 409 key_exists            (csrf)
//!   GET  /api/history  - 200 [NotesEvent]
//!   POST /api/history  - 201 NotesEvent | 400 invalid_event (csrf)

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sealnote_core::{AppendEvent, SocketFrame, WrappedKey};
use sealnote_store::{ShapeError, StoreError};
use serde_json::json;

use crate::auth::{AuthError, AuthSession, CsrfSession};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed request body: {0}")]
    Body(String),
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Body(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Auth(e) => return e.into_response(),
            ApiError::Store(StoreError::Shape(shape @ ShapeError::MalformedKey)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_key", "reason": shape.reason() }),
            ),
            ApiError::Store(StoreError::Shape(shape)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_event", "reason": shape.reason() }),
            ),
            ApiError::Store(StoreError::KeyExists) => {
                (StatusCode::CONFLICT, json!({ "error": "key_exists" }))
            }
            ApiError::Store(StoreError::InvalidUser(_)) => {
                (StatusCode::BAD_REQUEST, json!({ "error": "invalid_user" }))
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal" }))
            }
            ApiError::Body(reason) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_event", "reason": "malformed_body", "detail": reason }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn get_key(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> Result<Response, ApiError> {
    match state.log.get_key(&session.username).await? {
        Some(key) => Ok(Json(key).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" }))).into_response()),
    }
}

pub async fn create_key(
    State(state): State<AppState>,
    CsrfSession(session): CsrfSession,
    body: Result<Json<WrappedKey>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(key) = body?;
    state.log.create_key(&session.username, key.clone()).await?;
    tracing::info!(user = %session.username, "wrapped key created");
    Ok((StatusCode::CREATED, Json(key)).into_response())
}

pub async fn list_history(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> Result<Response, ApiError> {
    let events = state.log.list(&session.username).await?;
    Ok(Json(events).into_response())
}

pub async fn append_history(
    State(state): State<AppState>,
    CsrfSession(session): CsrfSession,
    body: Result<Json<AppendEvent>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(append) = body?;
    let user = session.username.as_str();

    let stored = match state.log.append(user, append).await {
        Ok(stored) => stored,
        Err(StoreError::Shape(shape)) => {
            state.metrics.rejected(shape.reason());
            tracing::info!(user, reason = shape.reason(), "append rejected");
            return Err(StoreError::Shape(shape).into());
        }
        Err(e) => return Err(e.into()),
    };

    state.metrics.appended(stored.kind.as_str());
    tracing::info!(user, event_id = %stored.id, kind = %stored.kind, "event appended");

    state.feed.publish(user, Some(stored.id.clone()));
    if let Some(remote) = &state.remote_broker {
        remote.publish_detached(user, SocketFrame::NotesChanged);
    }

    Ok((StatusCode::CREATED, Json(stored)).into_response())
}
