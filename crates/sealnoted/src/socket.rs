//! Socket broker surface
//!
//!   GET  /ws                - WebSocket for an authenticated session
//!   POST /internal/publish  - fan a frame out to a user's sockets (x-broker-secret)
//!   GET  /health            - connection counts

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        rejection::JsonRejection,
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use sealnote_core::SocketFrame;
use sealnote_sync::{Outbound, Session};
use secrecy::ExposeSecret;
use serde_json::json;
use tokio::sync::mpsc;

use crate::auth::{secrets_match, AuthError, AuthSession, BROKER_SECRET_HEADER};
use crate::publish::{check_event, PublishRequest, PublishResponse};
use crate::state::AppState;

/// Per-socket outbound queue depth; frames beyond it are dropped.
const SOCKET_QUEUE: usize = 32;

pub async fn ws_upgrade(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, session, socket))
}

async fn serve_socket(state: AppState, session: Session, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel(SOCKET_QUEUE);
    let user = session.username.clone();
    let conn = state.broker.register(&user, &session.id, tx);
    state.metrics.socket_opened();

    let (mut sink, mut incoming) = socket.split();
    let hello = Message::Text(SocketFrame::Hello.to_value().to_string().into());

    if sink.send(hello).await.is_ok() {
        loop {
            tokio::select! {
                out = rx.recv() => match out {
                    Some(Outbound::Frame(frame)) => {
                        let text = frame.to_string();
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                msg = incoming.next() => match msg {
                    // Client frames carry nothing the broker acts on.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    state.broker.unregister(&user, conn);
    state.metrics.socket_closed();
    tracing::debug!(user = %user, conn, "socket closed");
}

pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Response {
    let sent = headers
        .get(BROKER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let authorized = state
        .broker_secret
        .as_ref()
        .is_some_and(|secret| secrets_match(sent, secret.expose_secret()));
    if !authorized {
        tracing::warn!("publish with bad broker secret");
        return AuthError::BadSecret.into_response();
    }

    let Ok(Json(req)) = body else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_body" }))).into_response();
    };
    if let Err(e) = check_event(&req.event) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_event", "reason": e.to_string() })),
        )
            .into_response();
    }

    let delivered = state.broker.fan_out(&req.username, &req.event);
    state.metrics.fanned_out(delivered);
    tracing::debug!(user = %req.username, event = %req.event["type"], delivered, "published");
    Json(PublishResponse {
        ok: true,
        delivered,
    })
    .into_response()
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state.broker.snapshot_counts();
    Json(json!({
        "ok": true,
        "connectionsTotal": counts.connections_total,
        "usersConnected": counts.users_connected,
    }))
}
