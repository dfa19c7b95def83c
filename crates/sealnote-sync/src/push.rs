//! Per-connection push stream: `hello`, the current head, then a fixed-period
//! heartbeat that reports head changes.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use sealnote_core::EventId;
use sealnote_store::NotesLog;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::feed::{ChangeFeed, LogChanged};

/// One named event on the push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Hello,
    NotesChanged { id: Option<EventId> },
    Ping,
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::Hello => "hello",
            PushEvent::NotesChanged { .. } => "notes:changed",
            PushEvent::Ping => "ping",
        }
    }

    pub fn data(&self) -> serde_json::Value {
        match self {
            PushEvent::NotesChanged { id } => serde_json::json!({ "id": id }),
            PushEvent::Hello | PushEvent::Ping => serde_json::json!({}),
        }
    }
}

pub struct PushTicker {
    log: Arc<dyn NotesLog>,
    username: String,
    period: Duration,
    changes: broadcast::Receiver<LogChanged>,
}

impl PushTicker {
    /// Subscribes to `feed` immediately, so changes published before the
    /// stream is first polled still wake it.
    pub fn new(
        log: Arc<dyn NotesLog>,
        username: impl Into<String>,
        period: Duration,
        feed: &ChangeFeed,
    ) -> Self {
        Self {
            log,
            username: username.into(),
            period,
            changes: feed.subscribe(),
        }
    }

    /// The endless event stream. Dropping it drops the timer and the feed
    /// subscription.
    pub fn into_stream(self) -> impl Stream<Item = PushEvent> + Send + 'static {
        let mut timer = tokio::time::interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let state = TickerState {
            ticker: self,
            timer,
            last_sent: None,
            stage: Stage::Hello,
            feed_open: true,
        };
        stream::unfold(state, |mut state| async move {
            let event = state.next_event().await;
            Some((event, state))
        })
    }
}

enum Stage {
    Hello,
    Initial,
    Ticking,
}

struct TickerState {
    ticker: PushTicker,
    timer: Interval,
    last_sent: Option<EventId>,
    stage: Stage,
    feed_open: bool,
}

impl TickerState {
    async fn next_event(&mut self) -> PushEvent {
        match self.stage {
            Stage::Hello => {
                self.stage = Stage::Initial;
                PushEvent::Hello
            }
            Stage::Initial => {
                self.stage = Stage::Ticking;
                let id = self.latest().await;
                self.last_sent = id.clone();
                PushEvent::NotesChanged { id }
            }
            Stage::Ticking => {
                self.wait().await;
                let id = self.latest().await;
                if id != self.last_sent {
                    self.last_sent = id.clone();
                    PushEvent::NotesChanged { id }
                } else {
                    PushEvent::Ping
                }
            }
        }
    }

    /// Sleep until the next tick, or until the feed reports a change for
    /// this user (which also restarts the period).
    async fn wait(&mut self) {
        let username = self.ticker.username.as_str();
        tokio::select! {
            _ = self.timer.tick() => {}
            woke = wait_for_user(&mut self.ticker.changes, username), if self.feed_open => {
                if woke {
                    self.timer.reset();
                } else {
                    self.feed_open = false;
                    self.timer.tick().await;
                }
            }
        }
    }

    async fn latest(&self) -> Option<EventId> {
        match self.ticker.log.latest_id(&self.ticker.username).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(user = %self.ticker.username, error = %e, "latest id lookup failed");
                self.last_sent.clone()
            }
        }
    }
}

/// `true` when a change for `username` arrived (or changes were dropped),
/// `false` once the feed is closed.
async fn wait_for_user(rx: &mut broadcast::Receiver<LogChanged>, username: &str) -> bool {
    loop {
        match rx.recv().await {
            Ok(change) if change.username == username => return true,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "push ticker lagged behind change feed");
                return true;
            }
            Err(RecvError::Closed) => return false,
        }
    }
}
