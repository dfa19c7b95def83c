//! Durable log backend over any OpenDAL operator (memory, fs, S3)
//!
//! Layout per user, under the configured prefix:
//!
//! ```text
//! {prefix}/users/{user}/key.json
//! {prefix}/users/{user}/head.json
//! {prefix}/users/{user}/events/{seq:020}.json
//! ```
//!
//! `head.json` is the commit point: an event exists once the head names its
//! sequence number. An object past the head is the remains of an append whose
//! head write failed; readers ignore it and the next append overwrites it.
//! Committed event objects are never rewritten. Appends for one user are
//! serialized by an in-process mutex.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opendal::{ErrorKind, Operator};
use sealnote_core::{AppendEvent, EventId, NotesEvent, WrappedKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::log::{
    next_timestamp, validate_append, validate_user, validate_wrapped_key, NotesLog,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Head {
    seq: u64,
    latest_id: Option<EventId>,
    latest_at: Option<DateTime<Utc>>,
}

pub struct ObjectLog {
    op: Operator,
    prefix: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ObjectLog {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        Self {
            op,
            prefix,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_dir(&self, user: &str) -> String {
        if self.prefix.is_empty() {
            format!("users/{user}/")
        } else {
            format!("{}/users/{user}/", self.prefix)
        }
    }

    fn event_path(&self, user: &str, seq: u64) -> String {
        format!("{}events/{seq:020}.json", self.user_dir(user))
    }

    fn head_path(&self, user: &str) -> String {
        format!("{}head.json", self.user_dir(user))
    }

    async fn user_lock(&self, user: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(user.to_string()).or_default().clone()
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Option<T>> {
        let buf = match self.op.read(path).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(backend(path, e)),
        };
        serde_json::from_slice(&buf.to_vec())
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn write_json<T: Serialize>(&self, path: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        self.op
            .write(path, bytes)
            .await
            .map_err(|e| backend(path, e))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        match self.op.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(backend(path, e)),
        }
    }

    async fn read_head(&self, user: &str) -> StoreResult<Head> {
        Ok(self.read_json(&self.head_path(user)).await?.unwrap_or_default())
    }
}

/// Sequence number encoded in an event object name.
fn event_seq(name: &str) -> Option<u64> {
    name.strip_suffix(".json")?.parse().ok()
}

fn backend(path: &str, e: opendal::Error) -> StoreError {
    StoreError::Backend(format!("{path}: {e}"))
}

#[async_trait]
impl NotesLog for ObjectLog {
    async fn append(&self, user: &str, event: AppendEvent) -> StoreResult<NotesEvent> {
        validate_user(user)?;
        validate_append(&event)?;

        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        let head = self.read_head(user).await?;
        let seq = head.seq + 1;
        let path = self.event_path(user, seq);
        if self.exists(&path).await? {
            tracing::warn!(user, seq, "overwriting uncommitted event object");
        }

        let stored = event.into_event(EventId::generate(), next_timestamp(head.latest_at));
        self.write_json(&path, &stored).await?;
        self.write_json(
            &self.head_path(user),
            &Head {
                seq,
                latest_id: Some(stored.id.clone()),
                latest_at: Some(stored.created_at),
            },
        )
        .await?;

        tracing::debug!(user, seq, id = %stored.id, kind = %stored.kind, "event appended");
        Ok(stored)
    }

    async fn list(&self, user: &str) -> StoreResult<Vec<NotesEvent>> {
        validate_user(user)?;
        let head = self.read_head(user).await?;
        if head.seq == 0 {
            return Ok(Vec::new());
        }
        let dir = format!("{}events/", self.user_dir(user));

        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(backend(&dir, e)),
        };

        let mut committed: Vec<(u64, String)> = entries
            .into_iter()
            .filter_map(|e| {
                let seq = event_seq(e.name())?;
                (seq <= head.seq).then(|| (seq, e.path().to_string()))
            })
            .collect();
        committed.sort();

        let mut events = Vec::with_capacity(committed.len());
        for (_, path) in committed {
            if let Some(event) = self.read_json::<NotesEvent>(&path).await? {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn latest_id(&self, user: &str) -> StoreResult<Option<EventId>> {
        validate_user(user)?;
        Ok(self.read_head(user).await?.latest_id)
    }

    async fn get_key(&self, user: &str) -> StoreResult<Option<WrappedKey>> {
        validate_user(user)?;
        self.read_json(&format!("{}key.json", self.user_dir(user)))
            .await
    }

    async fn create_key(&self, user: &str, key: WrappedKey) -> StoreResult<()> {
        validate_user(user)?;
        validate_wrapped_key(&key)?;

        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        let path = format!("{}key.json", self.user_dir(user));
        if self.exists(&path).await? {
            return Err(StoreError::KeyExists);
        }
        self.write_json(&path, &key).await?;
        tracing::info!(user, "wrapped key stored");
        Ok(())
    }

    async fn check_health(&self) -> StoreResult<()> {
        crate::health::check_health(&self.op, &self.prefix)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
