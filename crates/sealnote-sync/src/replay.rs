//! Replay a user's event log into current notes plus the undo/redo cursor
//!
//! Two passes over the same slice:
//!
//! 1. Resolve undo/redo: every `undo(t)` marks `t` undone and pushes it on a
//!    stack; every `redo(t)` clears the mark and removes the most recent `t`
//!    from the stack.
//! 2. Materialize: walk the non-undone create/update/delete events in log
//!    order. The last one applied is the next undo target; the top of the
//!    stack is the next redo target.
//!
//! Last event in log order wins. There is no causal reconciliation between
//! devices.

use std::collections::{HashMap, HashSet};

use sealnote_core::{EventId, EventKind, NoteSnapshot, NotesEvent, ReconstructedState};
use sealnote_crypto::{decrypt_json, DekHandle};

/// Pure, deterministic reconstruction. Events whose `note` is `None`
/// (payload did not decrypt) still count as applied actions.
pub fn apply_notes_events(events: &[NotesEvent]) -> ReconstructedState {
    let mut undone: HashSet<&EventId> = HashSet::new();
    let mut undone_stack: Vec<&EventId> = Vec::new();

    for event in events {
        let Some(target) = event.target_event_id.as_ref() else {
            continue;
        };
        match event.kind {
            EventKind::Undo => {
                undone.insert(target);
                undone_stack.push(target);
            }
            EventKind::Redo => {
                undone.remove(target);
                if let Some(pos) = undone_stack.iter().rposition(|t| *t == target) {
                    undone_stack.remove(pos);
                }
            }
            _ => {}
        }
    }

    let mut notes_by_id: HashMap<&str, &NoteSnapshot> = HashMap::new();
    let mut last_applied: Option<&NotesEvent> = None;

    for event in events {
        if event.kind.carries_target() || undone.contains(&event.id) {
            continue;
        }
        match event.kind {
            EventKind::Create | EventKind::Update => {
                if let Some(note) = &event.note {
                    notes_by_id.insert(event.note_id.as_str(), note);
                }
            }
            EventKind::Delete => {
                notes_by_id.remove(event.note_id.as_str());
            }
            EventKind::Undo | EventKind::Redo => {}
        }
        last_applied = Some(event);
    }

    let mut notes: Vec<NoteSnapshot> = notes_by_id.into_values().cloned().collect();
    notes.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let redo_target = undone_stack.last().copied();
    let redo_note_id = redo_target.and_then(|t| {
        events
            .iter()
            .find(|e| &e.id == t)
            .map(|e| e.note_id.clone())
    });

    ReconstructedState {
        notes,
        can_undo: last_applied.is_some(),
        can_redo: redo_target.is_some(),
        undo_target_event_id: last_applied.map(|e| e.id.clone()),
        redo_target_event_id: redo_target.cloned(),
        undo_target_note_id: last_applied.map(|e| e.note_id.clone()),
        redo_target_note_id: redo_note_id,
    }
}

/// Decrypt the payload of every create/update event into `note`.
///
/// Individual failures are logged and leave `note` empty; they never abort
/// the batch.
pub fn decrypt_events(key: &DekHandle, mut events: Vec<NotesEvent>) -> Vec<NotesEvent> {
    let mut failed = 0usize;
    for event in events.iter_mut().filter(|e| e.kind.carries_payload()) {
        let (Some(iv), Some(ct)) = (&event.payload_iv, &event.payload_ciphertext) else {
            failed += 1;
            continue;
        };
        match decrypt_json::<NoteSnapshot>(key, iv, ct) {
            Ok(note) => event.note = Some(note),
            Err(e) => {
                failed += 1;
                tracing::warn!(event_id = %event.id, note_id = %event.note_id, error = %e, "skipping undecryptable payload");
            }
        }
    }
    if failed > 0 {
        tracing::debug!(failed, total = events.len(), "replay input had undecryptable events");
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn note(id: &str, title: &str, offset: i64) -> NoteSnapshot {
        NoteSnapshot {
            id: id.into(),
            title: title.into(),
            body: String::new(),
            created_at: t0() + Duration::seconds(offset),
            pinned: false,
        }
    }

    fn event(id: &str, kind: EventKind, note_id: &str) -> NotesEvent {
        NotesEvent {
            id: EventId::from(id),
            created_at: t0(),
            kind,
            note_id: note_id.into(),
            target_event_id: None,
            payload_iv: None,
            payload_ciphertext: None,
            note: None,
        }
    }

    fn write(id: &str, kind: EventKind, n: NoteSnapshot) -> NotesEvent {
        NotesEvent {
            note: Some(n.clone()),
            ..event(id, kind, &n.id)
        }
    }

    fn pointer(id: &str, kind: EventKind, target: &str) -> NotesEvent {
        NotesEvent {
            target_event_id: Some(EventId::from(target)),
            ..event(id, kind, "n1")
        }
    }

    #[test]
    fn empty_log_is_empty_state() {
        assert_eq!(apply_notes_events(&[]), ReconstructedState::default());
    }

    #[test]
    fn update_replaces_snapshot() {
        let events = [
            write("e1", EventKind::Create, note("n1", "A", 0)),
            write("e2", EventKind::Update, note("n1", "B", 0)),
        ];
        let state = apply_notes_events(&events);
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.notes[0].title, "B");
        assert!(state.can_undo);
        assert_eq!(state.undo_target_event_id, Some(EventId::from("e2")));
        assert_eq!(state.undo_target_note_id.as_deref(), Some("n1"));
        assert!(!state.can_redo);
    }

    #[test]
    fn undoing_an_update_restores_the_previous_snapshot() {
        let events = [
            write("e1", EventKind::Create, note("n1", "A", 0)),
            write("e2", EventKind::Update, note("n1", "B", 0)),
            pointer("u1", EventKind::Undo, "e2"),
        ];
        let state = apply_notes_events(&events);
        assert_eq!(state.notes[0].title, "A");
        assert_eq!(state.undo_target_event_id, Some(EventId::from("e1")));
        assert_eq!(state.redo_target_event_id, Some(EventId::from("e2")));
    }

    #[test]
    fn undoing_a_create_under_a_later_update_keeps_the_update() {
        let events = [
            write("e1", EventKind::Create, note("n1", "A", 0)),
            write("e2", EventKind::Update, note("n1", "B", 0)),
            pointer("u1", EventKind::Undo, "e1"),
        ];
        let state = apply_notes_events(&events);
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.notes[0].title, "B");
    }

    #[test]
    fn redo_removes_most_recent_stack_entry() {
        let events = [
            write("e1", EventKind::Create, note("n1", "A", 0)),
            write("e2", EventKind::Create, note("n2", "B", 1)),
            pointer("u1", EventKind::Undo, "e1"),
            pointer("u2", EventKind::Undo, "e2"),
            pointer("r1", EventKind::Redo, "e2"),
        ];
        let state = apply_notes_events(&events);
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.notes[0].id, "n2");
        assert_eq!(state.redo_target_event_id, Some(EventId::from("e1")));
        assert_eq!(state.undo_target_event_id, Some(EventId::from("e2")));
    }

    #[test]
    fn undecryptable_events_still_count_as_actions() {
        let events = [
            write("e1", EventKind::Create, note("n1", "A", 0)),
            event("e2", EventKind::Update, "n1"),
        ];
        let state = apply_notes_events(&events);
        assert_eq!(state.notes[0].title, "A");
        assert_eq!(state.undo_target_event_id, Some(EventId::from("e2")));
    }

    #[test]
    fn notes_sort_newest_first_with_id_tiebreak() {
        let events = [
            write("e1", EventKind::Create, note("b", "old", 0)),
            write("e2", EventKind::Create, note("c", "new", 10)),
            write("e3", EventKind::Create, note("a", "old too", 0)),
        ];
        let ids: Vec<_> = apply_notes_events(&events)
            .notes
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn decrypt_events_fills_notes_and_skips_failures() {
        use sealnote_crypto::{encrypt_json, generate_dek, import_dek};

        let key = import_dek(generate_dek());
        let other = import_dek(generate_dek());
        let good = encrypt_json(&key, &note("n1", "A", 0)).unwrap();
        let foreign = encrypt_json(&other, &note("n2", "B", 0)).unwrap();

        let mut e1 = event("e1", EventKind::Create, "n1");
        e1.payload_iv = Some(good.payload_iv);
        e1.payload_ciphertext = Some(good.payload_ciphertext);
        let mut e2 = event("e2", EventKind::Create, "n2");
        e2.payload_iv = Some(foreign.payload_iv);
        e2.payload_ciphertext = Some(foreign.payload_ciphertext);
        let e3 = event("e3", EventKind::Delete, "n1");

        let out = decrypt_events(&key, vec![e1, e2, e3]);
        assert_eq!(out[0].note.as_ref().map(|n| n.title.as_str()), Some("A"));
        assert!(out[1].note.is_none());
        assert!(out[2].note.is_none());
    }
}
