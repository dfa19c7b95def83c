//! Registry of live socket connections, keyed by username
//!
//! The broker owns no sockets. Each connection hands it a bounded sender and
//! a socket task drains the matching receiver. Frames are best effort: a full
//! or closed channel drops the frame. A frame is any small JSON object with a
//! string `type`; the broker's own frames are [`SocketFrame`]s.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use sealnote_core::SocketFrame;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::feed::ChangeFeed;
use crate::session_store::SessionStore;

pub type ConnectionId = u64;

/// What the broker asks a socket task to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Value),
    Close,
}

impl From<SocketFrame> for Outbound {
    fn from(frame: SocketFrame) -> Self {
        Outbound::Frame(frame.to_value())
    }
}

struct Connection {
    session_id: String,
    tx: mpsc::Sender<Outbound>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerCounts {
    /// Distinct sessions across all users, not raw sockets.
    pub connections_total: usize,
    pub users_connected: usize,
}

#[derive(Default)]
pub struct Broker {
    next_id: AtomicU64,
    users: Mutex<HashMap<String, HashMap<ConnectionId, Connection>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> MutexGuard<'_, HashMap<String, HashMap<ConnectionId, Connection>>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an already-authenticated connection.
    pub fn register(
        &self,
        username: &str,
        session_id: &str,
        tx: mpsc::Sender<Outbound>,
    ) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.users().entry(username.to_string()).or_default().insert(
            id,
            Connection {
                session_id: session_id.to_string(),
                tx,
            },
        );
        tracing::debug!(user = username, conn = id, "socket registered");
        id
    }

    /// Remove one connection; the user entry goes with its last connection.
    pub fn unregister(&self, username: &str, id: ConnectionId) -> bool {
        let mut users = self.users();
        let Some(conns) = users.get_mut(username) else {
            return false;
        };
        let removed = conns.remove(&id).is_some();
        if conns.is_empty() {
            users.remove(username);
        }
        if removed {
            tracing::debug!(user = username, conn = id, "socket unregistered");
        }
        removed
    }

    /// Queue `frame` on every connection of `username`. Returns how many
    /// connections accepted it.
    pub fn fan_out(&self, username: &str, frame: &Value) -> usize {
        let users = self.users();
        let Some(conns) = users.get(username) else {
            return 0;
        };
        conns
            .values()
            .filter(|c| c.tx.try_send(Outbound::Frame(frame.clone())).is_ok())
            .count()
    }

    pub fn snapshot_counts(&self) -> BrokerCounts {
        let users = self.users();
        let connections_total = users
            .values()
            .map(|conns| {
                conns
                    .values()
                    .map(|c| c.session_id.as_str())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .sum();
        BrokerCounts {
            connections_total,
            users_connected: users.len(),
        }
    }

    /// Close every connection whose session is revoked, expired or gone.
    /// Remaining connections of an affected user get `sessions:changed`.
    ///
    /// Session lookups happen without the registry lock held.
    pub async fn sweep(&self, sessions: &dyn SessionStore) -> usize {
        let mut session_ids: Vec<String> = {
            let users = self.users();
            users
                .values()
                .flat_map(|conns| conns.values().map(|c| c.session_id.clone()))
                .collect()
        };
        session_ids.sort();
        session_ids.dedup();

        let mut dead = HashSet::new();
        for sid in session_ids {
            if sessions.active(&sid).await.is_none() {
                dead.insert(sid);
            }
        }
        if dead.is_empty() {
            return 0;
        }

        let mut closed = 0;
        let mut users = self.users();
        users.retain(|username, conns| {
            let before = conns.len();
            conns.retain(|_, c| {
                let keep = !dead.contains(&c.session_id);
                if !keep {
                    let _ = c.tx.try_send(Outbound::Close);
                }
                keep
            });
            let removed = before - conns.len();
            if removed > 0 {
                closed += removed;
                tracing::info!(user = %username, closed = removed, "closed sockets of ended sessions");
                for c in conns.values() {
                    let _ = c.tx.try_send(SocketFrame::SessionsChanged.into());
                }
            }
            !conns.is_empty()
        });
        closed
    }

    /// Run [`Broker::sweep`] every `every` until the task is aborted, then
    /// drop ended sessions from the store.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        sessions: Arc<dyn SessionStore>,
        every: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(every);
            timer.tick().await;
            loop {
                timer.tick().await;
                let closed = self.sweep(sessions.as_ref()).await;
                let pruned = sessions.prune(Utc::now()).await;
                if closed > 0 || pruned > 0 {
                    tracing::debug!(closed, pruned, "session sweep finished");
                }
            }
        })
    }

    /// Forward every change on `feed` as `notes:changed` to that user's
    /// sockets. `on_delivered` sees the per-change delivery count.
    pub fn spawn_feed_forwarder<F>(self: Arc<Self>, feed: &ChangeFeed, on_delivered: F) -> JoinHandle<()>
    where
        F: Fn(usize) + Send + 'static,
    {
        let mut rx = feed.subscribe();
        let notes_changed = SocketFrame::NotesChanged.to_value();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        let n = self.fan_out(&change.username, &notes_changed);
                        on_delivered(n);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "broker lagged behind change feed");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
