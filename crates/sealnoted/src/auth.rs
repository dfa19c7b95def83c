//! Session cookie authentication and CSRF verification for handlers

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sealnote_sync::Session;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::state::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const BROKER_SECRET_HEADER: &str = "x-broker-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Missing, unsigned, unknown, revoked or expired session.
    #[error("unauthorized")]
    Unauthorized,

    #[error("csrf token mismatch")]
    Csrf,

    #[error("bad broker secret")]
    BadSecret,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AuthError::Csrf => (StatusCode::FORBIDDEN, "csrf"),
            AuthError::BadSecret => (StatusCode::FORBIDDEN, "forbidden"),
        };
        (status, Json(serde_json::json!({ "error": code }))).into_response()
    }
}

/// An active session resolved from the signed cookie.
#[derive(Debug, Clone)]
pub struct AuthSession(pub Session);

/// An active session whose CSRF header also matched. Use on every
/// state-changing route.
#[derive(Debug, Clone)]
pub struct CsrfSession(pub Session);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = cookie_value(&parts.headers, &state.cookie_name).ok_or(AuthError::Unauthorized)?;
        let sid = state.signer.verify(&raw).ok_or(AuthError::Unauthorized)?;
        let session = state
            .sessions
            .active(&sid)
            .await
            .ok_or(AuthError::Unauthorized)?;
        Ok(AuthSession(session))
    }
}

impl FromRequestParts<AppState> for CsrfSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthSession(session) = AuthSession::from_request_parts(parts, state).await?;
        let sent = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Csrf)?;
        if !secrets_match(sent, &session.csrf_token) {
            tracing::warn!(user = %session.username, "csrf token mismatch");
            return Err(AuthError::Csrf);
        }
        Ok(CsrfSession(session))
    }
}

/// Constant-time string comparison.
pub fn secrets_match(a: &str, b: &str) -> bool {
    !b.is_empty() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Find `name` among the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
}
