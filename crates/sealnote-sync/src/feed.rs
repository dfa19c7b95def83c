//! The single "a user's log changed" source that every notification path
//! subscribes to.

use sealnote_core::EventId;
use tokio::sync::broadcast;

/// One accepted append. Carries routing only, never content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChanged {
    pub username: String,
    pub latest_id: Option<EventId>,
}

/// Broadcast fan-in for log changes, cloned into every publisher and
/// subscriber.
///
/// Slow subscribers lag rather than block publishers; a lagged subscriber
/// should treat the gap as "something changed" and re-pull.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<LogChanged>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of live subscribers the change reached.
    pub fn publish(&self, username: &str, latest_id: Option<EventId>) -> usize {
        let change = LogChanged {
            username: username.to_string(),
            latest_id,
        };
        // No subscribers is not an error; nobody is listening yet.
        self.tx.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogChanged> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
