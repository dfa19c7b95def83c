//! sealnoted: the notes API server and socket broker
//!
//! The binary in `main.rs` only parses flags; everything else lives here so
//! the routers can be driven directly in tests.

pub mod api;
pub mod auth;
pub mod daemon;
pub mod metrics;
pub mod publish;
pub mod socket;
pub mod state;
pub mod stream;

use axum::{
    routing::{get, post},
    Router,
};

pub use state::AppState;

/// Application routes: key record, event log and push stream.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/key", get(api::get_key).post(api::create_key))
        .route("/api/history", get(api::list_history).post(api::append_history))
        .route("/api/stream", get(stream::push_stream))
        .with_state(state)
}

/// Broker routes: sockets, internal publish and connection health.
pub fn broker_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(socket::ws_upgrade))
        .route("/internal/publish", post(socket::publish))
        .route("/health", get(socket::health))
        .with_state(state)
}
