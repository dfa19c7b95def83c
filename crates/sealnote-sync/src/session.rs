//! Client-side notes session: the unlocked data key plus the operations that
//! turn user intent into append requests.

use chrono::Utc;
use sealnote_core::{AppendEvent, EventKind, NoteSnapshot, NotesEvent, ReconstructedState, WrappedKey};
use sealnote_crypto::{
    create_wrapped_dek_with_params, encrypt_json, import_dek, unwrap_dek_with_params, CryptoError,
    DekHandle, KdfParams,
};
use secrecy::SecretString;

use crate::replay::{apply_notes_events, decrypt_events};

/// Holds the DEK for one unlocked session. Dropping it discards the key.
///
/// Every operation that encrypts or decrypts goes through a session value, so
/// there is no ambient "current key".
#[derive(Debug)]
pub struct NotesSession {
    key: DekHandle,
}

impl NotesSession {
    pub fn new(key: DekHandle) -> Self {
        Self { key }
    }

    /// First-time setup: mint a DEK, wrap it, and return the record to upload.
    pub fn initialize(passphrase: &SecretString) -> Result<(Self, WrappedKey), CryptoError> {
        Self::initialize_with_params(passphrase, &KdfParams::default())
    }

    pub fn initialize_with_params(
        passphrase: &SecretString,
        params: &KdfParams,
    ) -> Result<(Self, WrappedKey), CryptoError> {
        let (wrapped, dek) = create_wrapped_dek_with_params(passphrase, params)?;
        Ok((Self::new(import_dek(dek)), wrapped))
    }

    /// Unwrap the stored key record. Any failure is [`CryptoError::UnlockFailed`].
    pub fn unlock(passphrase: &SecretString, wrapped: &WrappedKey) -> Result<Self, CryptoError> {
        Self::unlock_with_params(passphrase, wrapped, &KdfParams::default())
    }

    pub fn unlock_with_params(
        passphrase: &SecretString,
        wrapped: &WrappedKey,
        params: &KdfParams,
    ) -> Result<Self, CryptoError> {
        let dek = unwrap_dek_with_params(passphrase, wrapped, params)?;
        Ok(Self::new(import_dek(dek)))
    }

    /// Key handle for encrypting other client-side payloads.
    pub fn key(&self) -> &DekHandle {
        &self.key
    }

    /// Build a `create` event for a brand-new note.
    pub fn create_note(
        &self,
        title: &str,
        body: &str,
    ) -> Result<(NoteSnapshot, AppendEvent), CryptoError> {
        let note = NoteSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            pinned: false,
        };
        let event = self.snapshot_event(EventKind::Create, &note)?;
        Ok((note, event))
    }

    /// Build an `update` event carrying the full new snapshot.
    pub fn update_note(&self, note: &NoteSnapshot) -> Result<AppendEvent, CryptoError> {
        self.snapshot_event(EventKind::Update, note)
    }

    pub fn delete_note(&self, note_id: &str) -> AppendEvent {
        AppendEvent {
            kind: EventKind::Delete,
            note_id: note_id.to_string(),
            target_event_id: None,
            payload_iv: None,
            payload_ciphertext: None,
        }
    }

    /// `undo` of the last applied action, or `None` if there is nothing to undo.
    pub fn undo(&self, state: &ReconstructedState) -> Option<AppendEvent> {
        let target = state.undo_target_event_id.clone().filter(|_| state.can_undo)?;
        let note_id = state
            .undo_target_note_id
            .clone()
            .unwrap_or_else(|| target.to_string());
        Some(AppendEvent {
            kind: EventKind::Undo,
            note_id,
            target_event_id: Some(target),
            payload_iv: None,
            payload_ciphertext: None,
        })
    }

    /// `redo` of the most recently undone action, or `None`.
    pub fn redo(&self, state: &ReconstructedState) -> Option<AppendEvent> {
        let target = state.redo_target_event_id.clone().filter(|_| state.can_redo)?;
        // A target missing from the log has no known note; its id still
        // satisfies the non-empty note_id rule.
        let note_id = state
            .redo_target_note_id
            .clone()
            .unwrap_or_else(|| target.to_string());
        Some(AppendEvent {
            kind: EventKind::Redo,
            note_id,
            target_event_id: Some(target),
            payload_iv: None,
            payload_ciphertext: None,
        })
    }

    /// Decrypt and replay a freshly fetched log.
    pub fn reconstruct(&self, events: Vec<NotesEvent>) -> ReconstructedState {
        let events = decrypt_events(&self.key, events);
        apply_notes_events(&events)
    }

    fn snapshot_event(&self, kind: EventKind, note: &NoteSnapshot) -> Result<AppendEvent, CryptoError> {
        let payload = encrypt_json(&self.key, note)?;
        Ok(AppendEvent {
            kind,
            note_id: note.id.clone(),
            target_event_id: None,
            payload_iv: Some(payload.payload_iv),
            payload_ciphertext: Some(payload.payload_ciphertext),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealnote_core::EventId;

    fn fast() -> KdfParams {
        KdfParams { iterations: 1_000 }
    }

    fn stamp(seq: u32, append: AppendEvent) -> NotesEvent {
        append.into_event(EventId::from(format!("e{seq:03}")), Utc::now())
    }

    #[test]
    fn initialize_then_unlock_reads_same_notes() {
        let pass = SecretString::from("correct horse");
        let (session, wrapped) = NotesSession::initialize_with_params(&pass, &fast()).unwrap();
        let (_, create) = session.create_note("hello", "world").unwrap();
        let log = vec![stamp(1, create)];

        let other_device = NotesSession::unlock_with_params(&pass, &wrapped, &fast()).unwrap();
        let state = other_device.reconstruct(log);
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.notes[0].title, "hello");
        assert_eq!(state.notes[0].body, "world");
    }

    #[test]
    fn wrong_passphrase_fails_to_unlock() {
        let (_, wrapped) =
            NotesSession::initialize_with_params(&SecretString::from("a"), &fast()).unwrap();
        let err = NotesSession::unlock_with_params(&SecretString::from("b"), &wrapped, &fast())
            .unwrap_err();
        assert_eq!(err, CryptoError::UnlockFailed);
    }

    #[test]
    fn edit_pin_delete_undo_redo_cycle() {
        let (session, _) =
            NotesSession::initialize_with_params(&SecretString::from("p"), &fast()).unwrap();
        let (mut note, create) = session.create_note("draft", "").unwrap();
        let mut log = vec![stamp(1, create)];

        note.pinned = true;
        log.push(stamp(2, session.update_note(&note).unwrap()));
        let state = session.reconstruct(log.clone());
        assert!(state.notes[0].pinned);

        log.push(stamp(3, session.delete_note(&note.id)));
        let state = session.reconstruct(log.clone());
        assert!(state.notes.is_empty());

        let undo = session.undo(&state).unwrap();
        assert_eq!(undo.target_event_id, Some(EventId::from("e003")));
        assert_eq!(undo.note_id, note.id);
        log.push(stamp(4, undo));
        let state = session.reconstruct(log.clone());
        assert_eq!(state.notes.len(), 1);
        assert!(state.notes[0].pinned);

        let redo = session.redo(&state).unwrap();
        log.push(stamp(5, redo));
        let state = session.reconstruct(log);
        assert!(state.notes.is_empty());
        assert!(!state.can_redo);
    }

    #[test]
    fn nothing_to_undo_or_redo_on_empty_state() {
        let session = NotesSession::new(import_dek(sealnote_crypto::generate_dek()));
        let state = ReconstructedState::default();
        assert!(session.undo(&state).is_none());
        assert!(session.redo(&state).is_none());
    }

    #[test]
    fn built_events_pass_store_validation() {
        let session = NotesSession::new(import_dek(sealnote_crypto::generate_dek()));
        let (note, create) = session.create_note("t", "b").unwrap();
        sealnote_store::validate_append(&create).unwrap();
        sealnote_store::validate_append(&session.update_note(&note).unwrap()).unwrap();
        sealnote_store::validate_append(&session.delete_note(&note.id)).unwrap();
    }
}
