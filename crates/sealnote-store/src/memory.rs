//! In-process log backend, used by tests and single-node deployments that do
//! not need durability.

use std::collections::HashMap;

use async_trait::async_trait;
use sealnote_core::{AppendEvent, EventId, NotesEvent, WrappedKey};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::log::{next_timestamp, validate_append, validate_wrapped_key, NotesLog};

#[derive(Default)]
struct UserLog {
    events: Vec<NotesEvent>,
    key: Option<WrappedKey>,
}

#[derive(Default)]
pub struct MemoryLog {
    users: RwLock<HashMap<String, UserLog>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotesLog for MemoryLog {
    async fn append(&self, user: &str, event: AppendEvent) -> StoreResult<NotesEvent> {
        validate_append(&event)?;

        let mut users = self.users.write().await;
        let log = users.entry(user.to_string()).or_default();
        let created_at = next_timestamp(log.events.last().map(|e| e.created_at));
        let stored = event.into_event(EventId::generate(), created_at);
        log.events.push(stored.clone());

        tracing::debug!(user, id = %stored.id, kind = %stored.kind, "event appended");
        Ok(stored)
    }

    async fn list(&self, user: &str) -> StoreResult<Vec<NotesEvent>> {
        let users = self.users.read().await;
        Ok(users.get(user).map(|l| l.events.clone()).unwrap_or_default())
    }

    async fn latest_id(&self, user: &str) -> StoreResult<Option<EventId>> {
        let users = self.users.read().await;
        Ok(users
            .get(user)
            .and_then(|l| l.events.last())
            .map(|e| e.id.clone()))
    }

    async fn get_key(&self, user: &str) -> StoreResult<Option<WrappedKey>> {
        let users = self.users.read().await;
        Ok(users.get(user).and_then(|l| l.key.clone()))
    }

    async fn create_key(&self, user: &str, key: WrappedKey) -> StoreResult<()> {
        validate_wrapped_key(&key)?;

        let mut users = self.users.write().await;
        let log = users.entry(user.to_string()).or_default();
        if log.key.is_some() {
            return Err(StoreError::KeyExists);
        }
        log.key = Some(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealnote_core::EventKind;

    fn delete(note: &str) -> AppendEvent {
        AppendEvent {
            kind: EventKind::Delete,
            note_id: note.into(),
            target_event_id: None,
            payload_iv: None,
            payload_ciphertext: None,
        }
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let log = MemoryLog::new();
        log.append("alice", delete("a")).await.unwrap();
        assert_eq!(log.list("alice").await.unwrap().len(), 1);
        assert!(log.list("bob").await.unwrap().is_empty());
        assert_eq!(log.latest_id("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_append_writes_nothing() {
        let log = MemoryLog::new();
        let bad = AppendEvent {
            kind: EventKind::Undo,
            ..delete("a")
        };
        assert!(matches!(
            log.append("alice", bad).await,
            Err(StoreError::Shape(_))
        ));
        assert!(log.list("alice").await.unwrap().is_empty());
    }
}
