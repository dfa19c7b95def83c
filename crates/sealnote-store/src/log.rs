//! The append-only log contract and the shape rules every backend enforces.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sealnote_core::{AppendEvent, EventId, NotesEvent, WrappedKey};

use crate::error::{ShapeError, StoreError, StoreResult};

/// Length of a payload nonce once base64-decoded.
const PAYLOAD_NONCE_LEN: usize = 12;

/// Durable per-user event log plus the one-time wrapped key record.
///
/// Backends never see plaintext. Events are immutable once appended and
/// `list` returns them in append order.
#[async_trait]
pub trait NotesLog: Send + Sync {
    /// Validate, stamp with an id and timestamp, and store one event.
    async fn append(&self, user: &str, event: AppendEvent) -> StoreResult<NotesEvent>;

    /// The user's complete event sequence, oldest first.
    async fn list(&self, user: &str) -> StoreResult<Vec<NotesEvent>>;

    /// Id of the newest event, without reading the log.
    async fn latest_id(&self, user: &str) -> StoreResult<Option<EventId>>;

    async fn get_key(&self, user: &str) -> StoreResult<Option<WrappedKey>>;

    /// Store the wrapped key. Fails with [`StoreError::KeyExists`] if the
    /// user already has one.
    async fn create_key(&self, user: &str, key: WrappedKey) -> StoreResult<()>;

    /// Whether the backing storage is reachable.
    async fn check_health(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Check the per-kind shape invariants of an append request.
pub fn validate_append(event: &AppendEvent) -> Result<(), ShapeError> {
    if event.note_id.trim().is_empty() {
        return Err(ShapeError::MissingNoteId);
    }

    let kind = event.kind;
    let has_iv = event.payload_iv.is_some();
    let has_ct = event.payload_ciphertext.is_some();
    let has_target = event.target_event_id.is_some();

    if kind.carries_payload() {
        let (Some(iv), Some(ct)) = (&event.payload_iv, &event.payload_ciphertext) else {
            return Err(ShapeError::MissingPayload(kind));
        };
        let iv_ok = STANDARD
            .decode(iv)
            .map(|b| b.len() == PAYLOAD_NONCE_LEN)
            .unwrap_or(false);
        if !iv_ok || ct.is_empty() || STANDARD.decode(ct).is_err() {
            return Err(ShapeError::MalformedPayload);
        }
    } else if has_iv || has_ct {
        return Err(ShapeError::UnexpectedPayload(kind));
    }

    if kind.carries_target() {
        match &event.target_event_id {
            Some(t) if !t.as_str().is_empty() => {}
            _ => return Err(ShapeError::MissingTarget(kind)),
        }
    } else if has_target {
        return Err(ShapeError::UnexpectedTarget(kind));
    }

    Ok(())
}

/// Check that a wrapped key record has all three base64 fields.
pub fn validate_wrapped_key(key: &WrappedKey) -> Result<(), ShapeError> {
    let fields = [&key.kdf_salt, &key.wrapped_key_iv, &key.wrapped_key_ciphertext];
    if fields
        .iter()
        .any(|f| f.is_empty() || STANDARD.decode(f.as_str()).is_err())
    {
        return Err(ShapeError::MalformedKey);
    }
    Ok(())
}

/// Usernames become object-key segments, so they must be path-safe.
pub(crate) fn validate_user(user: &str) -> StoreResult<()> {
    let ok = !user.is_empty()
        && user != "."
        && user != ".."
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidUser(user.to_string()))
    }
}

/// Timestamp for a new event: now, but never earlier than the previous event,
/// so `(created_at, id)` order always agrees with append order.
pub(crate) fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealnote_core::EventKind;

    const IV: &str = "AAAAAAAAAAAAAAAA"; // 12 zero bytes
    const CT: &str = "Y2lwaGVydGV4dA==";

    fn append(kind: EventKind) -> AppendEvent {
        AppendEvent {
            kind,
            note_id: "n1".into(),
            target_event_id: None,
            payload_iv: None,
            payload_ciphertext: None,
        }
    }

    fn with_payload(kind: EventKind) -> AppendEvent {
        AppendEvent {
            payload_iv: Some(IV.into()),
            payload_ciphertext: Some(CT.into()),
            ..append(kind)
        }
    }

    fn with_target(kind: EventKind) -> AppendEvent {
        AppendEvent {
            target_event_id: Some(EventId::from("e1")),
            ..append(kind)
        }
    }

    #[test]
    fn accepts_well_formed_events() {
        assert_eq!(validate_append(&with_payload(EventKind::Create)), Ok(()));
        assert_eq!(validate_append(&with_payload(EventKind::Update)), Ok(()));
        assert_eq!(validate_append(&append(EventKind::Delete)), Ok(()));
        assert_eq!(validate_append(&with_target(EventKind::Undo)), Ok(()));
        assert_eq!(validate_append(&with_target(EventKind::Redo)), Ok(()));
    }

    #[test]
    fn create_without_payload_is_rejected() {
        let err = validate_append(&append(EventKind::Create)).unwrap_err();
        assert_eq!(err, ShapeError::MissingPayload(EventKind::Create));
        assert_eq!(err.reason(), "missing_payload");

        let half = AppendEvent {
            payload_iv: Some(IV.into()),
            ..append(EventKind::Update)
        };
        assert_eq!(
            validate_append(&half).unwrap_err().reason(),
            "missing_payload"
        );
    }

    #[test]
    fn undo_without_target_is_rejected() {
        let err = validate_append(&append(EventKind::Undo)).unwrap_err();
        assert_eq!(err.reason(), "missing_target");

        let empty = AppendEvent {
            target_event_id: Some(EventId::from("")),
            ..append(EventKind::Redo)
        };
        assert_eq!(validate_append(&empty).unwrap_err().reason(), "missing_target");
    }

    #[test]
    fn undo_with_payload_is_rejected() {
        let event = AppendEvent {
            payload_iv: Some(IV.into()),
            payload_ciphertext: Some(CT.into()),
            ..with_target(EventKind::Undo)
        };
        assert_eq!(
            validate_append(&event).unwrap_err(),
            ShapeError::UnexpectedPayload(EventKind::Undo)
        );
    }

    #[test]
    fn delete_carries_nothing() {
        assert_eq!(
            validate_append(&with_payload(EventKind::Delete))
                .unwrap_err()
                .reason(),
            "unexpected_payload"
        );
        assert_eq!(
            validate_append(&with_target(EventKind::Delete))
                .unwrap_err()
                .reason(),
            "unexpected_target"
        );
    }

    #[test]
    fn create_with_target_is_rejected() {
        let event = AppendEvent {
            target_event_id: Some(EventId::from("e0")),
            ..with_payload(EventKind::Create)
        };
        assert_eq!(validate_append(&event).unwrap_err().reason(), "unexpected_target");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let bad_b64 = AppendEvent {
            payload_ciphertext: Some("***".into()),
            ..with_payload(EventKind::Create)
        };
        assert_eq!(validate_append(&bad_b64).unwrap_err().reason(), "malformed_payload");

        let short_iv = AppendEvent {
            payload_iv: Some("AAAA".into()),
            ..with_payload(EventKind::Create)
        };
        assert_eq!(validate_append(&short_iv).unwrap_err().reason(), "malformed_payload");
    }

    #[test]
    fn blank_note_id_is_rejected() {
        let event = AppendEvent {
            note_id: "  ".into(),
            ..append(EventKind::Delete)
        };
        assert_eq!(validate_append(&event).unwrap_err(), ShapeError::MissingNoteId);
    }

    #[test]
    fn wrapped_key_fields_must_be_base64() {
        let good = WrappedKey {
            kdf_salt: "c2FsdA==".into(),
            wrapped_key_iv: IV.into(),
            wrapped_key_ciphertext: CT.into(),
        };
        assert_eq!(validate_wrapped_key(&good), Ok(()));

        let bad = WrappedKey {
            kdf_salt: String::new(),
            ..good
        };
        assert_eq!(validate_wrapped_key(&bad), Err(ShapeError::MalformedKey));
    }

    #[test]
    fn usernames_must_be_path_safe() {
        assert!(validate_user("alice").is_ok());
        assert!(validate_user("bob.smith@example.com").is_ok());
        assert!(validate_user("").is_err());
        assert!(validate_user("..").is_err());
        assert!(validate_user("a/b").is_err());
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let future = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(next_timestamp(Some(future)), future);
        assert!(next_timestamp(None) <= Utc::now());
    }
}
