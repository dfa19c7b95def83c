use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one event in a user's log.
///
/// The store mints UUIDv7 strings, so ids sort in append order. Any string is
/// accepted on the way in; replay never parses them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Mint a fresh, time-ordered event id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What an event does to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    Undo,
    Redo,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Undo => "undo",
            EventKind::Redo => "redo",
        }
    }

    /// create/update carry an encrypted snapshot.
    pub fn carries_payload(&self) -> bool {
        matches!(self, EventKind::Create | EventKind::Update)
    }

    /// undo/redo point at an earlier event.
    pub fn carries_target(&self) -> bool {
        matches!(self, EventKind::Undo | EventKind::Redo)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decrypted current value of one note. Only ever exists client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
}

/// One immutable entry of a user's notes log.
///
/// The server only ever sees ciphertext and routing metadata. `note` is
/// filled in client-side after decryption and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesEvent {
    pub id: EventId,
    pub created_at: DateTime<Utc>,
    pub kind: EventKind,
    pub note_id: String,
    #[serde(default)]
    pub target_event_id: Option<EventId>,
    #[serde(default)]
    pub payload_iv: Option<String>,
    #[serde(default)]
    pub payload_ciphertext: Option<String>,
    #[serde(skip)]
    pub note: Option<NoteSnapshot>,
}

/// Body of an append request; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEvent {
    pub kind: EventKind,
    pub note_id: String,
    #[serde(default)]
    pub target_event_id: Option<EventId>,
    #[serde(default)]
    pub payload_iv: Option<String>,
    #[serde(default)]
    pub payload_ciphertext: Option<String>,
}

impl AppendEvent {
    /// Stamp the request into a stored event.
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> NotesEvent {
        NotesEvent {
            id,
            created_at,
            kind: self.kind,
            note_id: self.note_id,
            target_event_id: self.target_event_id,
            payload_iv: self.payload_iv,
            payload_ciphertext: self.payload_ciphertext,
            note: None,
        }
    }
}

/// The passphrase-wrapped data key, as stored server-side (base64 fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub kdf_salt: String,
    pub wrapped_key_iv: String,
    pub wrapped_key_ciphertext: String,
}

/// Current notes plus the undo/redo cursor, derived from the full log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedState {
    pub notes: Vec<NoteSnapshot>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_target_event_id: Option<EventId>,
    pub redo_target_event_id: Option<EventId>,
    /// Note touched by the undo target, so an undo event can carry it.
    pub undo_target_note_id: Option<String>,
    pub redo_target_note_id: Option<String>,
}

/// Frames the socket broker sends to clients. None of them carry content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SocketFrame {
    #[serde(rename = "hello")]
    Hello,
    #[serde(rename = "notes:changed")]
    NotesChanged,
    #[serde(rename = "sessions:changed")]
    SessionsChanged,
}

impl SocketFrame {
    pub fn name(self) -> &'static str {
        match self {
            SocketFrame::Hello => "hello",
            SocketFrame::NotesChanged => "notes:changed",
            SocketFrame::SessionsChanged => "sessions:changed",
        }
    }

    pub fn to_value(self) -> serde_json::Value {
        serde_json::json!({ "type": self.name() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_serializes_lowercase() {
        let json = serde_json::to_string(&EventKind::Redo).unwrap();
        assert_eq!(json, "\"redo\"");
        let kind: EventKind = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(kind, EventKind::Delete);
    }

    #[test]
    fn generated_ids_sort_in_mint_order() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert!(a < b, "{a} should sort before {b}");
    }

    #[test]
    fn decrypted_note_is_never_serialized() {
        let event = NotesEvent {
            id: EventId::from("e1"),
            created_at: Utc::now(),
            kind: EventKind::Create,
            note_id: "n1".into(),
            target_event_id: None,
            payload_iv: Some("aXY=".into()),
            payload_ciphertext: Some("Y3Q=".into()),
            note: Some(NoteSnapshot {
                id: "n1".into(),
                title: "secret".into(),
                body: "plaintext".into(),
                created_at: Utc::now(),
                pinned: false,
            }),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("plaintext"));
        assert!(json.contains("\"target_event_id\":null"));
    }

    #[test]
    fn append_event_accepts_missing_optionals() {
        let append: AppendEvent =
            serde_json::from_str(r#"{"kind":"delete","note_id":"n1"}"#).unwrap();
        assert_eq!(append.kind, EventKind::Delete);
        assert!(append.target_event_id.is_none());
        assert!(append.payload_iv.is_none());
    }

    #[test]
    fn socket_frames_match_wire_names() {
        let json = serde_json::to_string(&SocketFrame::NotesChanged).unwrap();
        assert_eq!(json, r#"{"type":"notes:changed"}"#);
        assert_eq!(
            SocketFrame::SessionsChanged.to_value(),
            serde_json::json!({"type": "sessions:changed"})
        );
    }

    #[test]
    fn reconstructed_state_uses_camel_case() {
        let json = serde_json::to_value(ReconstructedState::default()).unwrap();
        assert_eq!(json["canUndo"], false);
        assert!(json["undoTargetEventId"].is_null());
    }
}
