//! Behaviour every NotesLog backend must share, run against each one.

use std::sync::Arc;

use opendal::Operator;
use sealnote_core::config::StoreConfig;
use sealnote_core::{AppendEvent, EventId, EventKind, WrappedKey};
use sealnote_store::{build_operator, MemoryLog, NotesLog, ObjectLog, StoreError};

const IV: &str = "AAAAAAAAAAAAAAAA";
const CT: &str = "c2VhbGVk";

fn create(note: &str) -> AppendEvent {
    AppendEvent {
        kind: EventKind::Create,
        note_id: note.into(),
        target_event_id: None,
        payload_iv: Some(IV.into()),
        payload_ciphertext: Some(CT.into()),
    }
}

fn undo(target: &EventId) -> AppendEvent {
    AppendEvent {
        kind: EventKind::Undo,
        note_id: "n1".into(),
        target_event_id: Some(target.clone()),
        payload_iv: None,
        payload_ciphertext: None,
    }
}

fn key() -> WrappedKey {
    WrappedKey {
        kdf_salt: "AAAAAAAAAAAAAAAAAAAAAA==".into(),
        wrapped_key_iv: IV.into(),
        wrapped_key_ciphertext: CT.into(),
    }
}

fn memory_object_log() -> ObjectLog {
    let op = Operator::new(opendal::services::Memory::default())
        .unwrap()
        .finish();
    ObjectLog::new(op, "sealnote")
}

async fn append_list_order(log: &dyn NotesLog) {
    let a = log.append("alice", create("n1")).await.unwrap();
    let b = log.append("alice", create("n2")).await.unwrap();
    let c = log.append("alice", undo(&b.id)).await.unwrap();

    let events = log.list("alice").await.unwrap();
    let ids: Vec<_> = events.iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec![a.id.clone(), b.id.clone(), c.id.clone()]);
    assert_eq!(events[2].target_event_id.as_ref(), Some(&b.id));
    assert!(events.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    assert_eq!(log.latest_id("alice").await.unwrap(), Some(c.id));
    assert!(log.list("bob").await.unwrap().is_empty());
}

async fn shape_errors_write_nothing(log: &dyn NotesLog) {
    let mut bad = create("n1");
    bad.payload_iv = None;
    let err = log.append("carol", bad).await.unwrap_err();
    match err {
        StoreError::Shape(shape) => assert_eq!(shape.reason(), "missing_payload"),
        other => panic!("expected shape error, got {other:?}"),
    }
    assert!(log.list("carol").await.unwrap().is_empty());
    assert_eq!(log.latest_id("carol").await.unwrap(), None);
}

async fn key_is_write_once(log: &dyn NotesLog) {
    assert_eq!(log.get_key("dave").await.unwrap(), None);
    log.create_key("dave", key()).await.unwrap();
    assert_eq!(log.get_key("dave").await.unwrap(), Some(key()));

    let again = log.create_key("dave", key()).await;
    assert!(matches!(again, Err(StoreError::KeyExists)));
}

async fn concurrent_appends_all_land(log: Arc<dyn NotesLog>) {
    let mut handles = Vec::new();
    for i in 0..16 {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            log.append("erin", create(&format!("n{i}"))).await.unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let events = log.list("erin").await.unwrap();
    assert_eq!(events.len(), 16);
    let mut ids: Vec<_> = events.iter().map(|e| e.id.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 16);
}

#[tokio::test]
async fn memory_log_contract() {
    let log = MemoryLog::new();
    append_list_order(&log).await;
    shape_errors_write_nothing(&log).await;
    key_is_write_once(&log).await;
    concurrent_appends_all_land(Arc::new(MemoryLog::new())).await;
}

#[tokio::test]
async fn object_log_contract_in_memory() {
    let log = memory_object_log();
    append_list_order(&log).await;
    shape_errors_write_nothing(&log).await;
    key_is_write_once(&log).await;
    log.check_health().await.unwrap();
    concurrent_appends_all_land(Arc::new(memory_object_log())).await;
}

#[tokio::test]
async fn object_log_contract_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        backend: "fs".into(),
        root: dir.path().to_path_buf(),
        ..Default::default()
    };
    let op = build_operator(&cfg, None).unwrap();
    let log = ObjectLog::new(op, &cfg.prefix);
    append_list_order(&log).await;
    shape_errors_write_nothing(&log).await;
    key_is_write_once(&log).await;

    assert!(dir
        .path()
        .join("sealnote/users/alice/events/00000000000000000001.json")
        .exists());
}

#[tokio::test]
async fn object_log_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        backend: "fs".into(),
        root: dir.path().to_path_buf(),
        ..Default::default()
    };

    let first = {
        let log = ObjectLog::new(build_operator(&cfg, None).unwrap(), &cfg.prefix);
        log.append("alice", create("n1")).await.unwrap()
    };

    let log = ObjectLog::new(build_operator(&cfg, None).unwrap(), &cfg.prefix);
    assert_eq!(log.latest_id("alice").await.unwrap(), Some(first.id.clone()));
    let second = log.append("alice", create("n2")).await.unwrap();
    let events = log.list("alice").await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, first.id);
    assert_eq!(events[1].id, second.id);
}
