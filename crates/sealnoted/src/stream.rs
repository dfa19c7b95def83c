//! `GET /api/stream`: the push channel as server-sent events

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};
use sealnote_sync::PushTicker;

use crate::auth::AuthSession;
use crate::state::AppState;

pub async fn push_stream(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(user = %session.username, "push stream opened");
    let ticker = PushTicker::new(
        state.log.clone(),
        session.username,
        state.push_interval,
        &state.feed,
    );
    let events = ticker
        .into_stream()
        .map(|ev| Ok(Event::default().event(ev.name()).data(ev.data().to_string())));
    Sse::new(events)
}
