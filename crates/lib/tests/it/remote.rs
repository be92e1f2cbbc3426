//! Document changes reaching the mirror.

use serde_json::json;
use ymirror::{
    MapNode, Value,
    y_crdt::{Any, Doc, Map, MapPrelim, Transact},
};

use crate::helpers::*;

fn seeded(doc: &Doc) -> ymirror::SyncSession {
    let mut session = map_session(doc);
    session
        .bootstrap(json!({
            "profile": { "name": "Alice", "age": 30 },
            "other": { "x": 1 },
            "flag": true,
        }))
        .unwrap();
    session
}

#[test]
fn test_hydrates_existing_document() {
    let doc = Doc::new();
    {
        let root = root_map_ref(&doc);
        let mut txn = doc.transact_mut();
        root.insert(&mut txn, "title", "hello");
        let nested = root.insert(&mut txn, "meta", MapPrelim::default());
        nested.insert(&mut txn, "views", 3.0);
    }

    let session = map_session(&doc);

    assert_eq!(
        session.mirror().to_json(),
        json!({ "title": "hello", "meta": { "views": 3 } })
    );
    assert_eq!(session.controller_count(), 2);
    assert!(!session.has_pending());
}

#[test]
fn test_remote_leaf_change_preserves_identity() {
    let doc = Doc::new();
    let mut session = seeded(&doc);
    let state = mirror_map(&session);
    let profile = child_map(&state, "profile");
    let other = child_map(&state, "other");

    {
        let shared = shared_child_map(&doc, "profile");
        let mut txn = doc.transact_mut();
        shared.insert(&mut txn, "name", "Bob");
    }
    let report = session.flush().unwrap();

    assert_eq!(report.notifications, 1);
    assert_eq!(report.mirror_changes, 1);
    assert!(child_map(&state, "profile").ptr_eq(&profile));
    assert!(child_map(&state, "other").ptr_eq(&other));
    assert_eq!(profile.get("name").unwrap(), "Bob");
    assert_in_sync(&session);
}

#[test]
fn test_remote_replacement_breaks_identity() {
    let doc = Doc::new();
    let mut session = seeded(&doc);
    let state = mirror_map(&session);
    let profile = child_map(&state, "profile");
    let other = child_map(&state, "other");

    {
        let root = root_map_ref(&doc);
        let mut txn = doc.transact_mut();
        let replacement = root.insert(&mut txn, "profile", MapPrelim::default());
        replacement.insert(&mut txn, "name", "Alice");
        replacement.insert(&mut txn, "age", 30.0);
    }
    session.flush().unwrap();

    let upgraded = child_map(&state, "profile");
    assert!(!upgraded.ptr_eq(&profile));
    assert!(!profile.is_attached());
    assert!(child_map(&state, "other").ptr_eq(&other));
    assert_eq!(upgraded.to_json(), json!({ "name": "Alice", "age": 30 }));

    // Writes through the new node reach the new container.
    upgraded.set("age", 31).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session)["profile"], json!({ "name": "Alice", "age": 31 }));
}

#[test]
fn test_remote_delete_and_null() {
    let doc = Doc::new();
    let mut session = seeded(&doc);
    let state = mirror_map(&session);
    let controllers = session.controller_count();

    {
        let root = root_map_ref(&doc);
        let mut txn = doc.transact_mut();
        root.remove(&mut txn, "other");
        root.insert(&mut txn, "flag", Any::Null);
    }
    session.flush().unwrap();

    assert!(!state.contains_key("other"));
    assert_eq!(state.get("flag"), Some(Value::Null));
    assert_eq!(session.controller_count(), controllers - 1);
    assert_in_sync(&session);
}

#[test]
fn test_nested_creation_in_one_transaction() {
    let doc = Doc::new();
    let mut session = map_session(&doc);

    {
        let root = root_map_ref(&doc);
        let mut txn = doc.transact_mut();
        let a = root.insert(&mut txn, "a", MapPrelim::default());
        let b = a.insert(&mut txn, "b", MapPrelim::default());
        b.insert(&mut txn, "c", 1.0);
        a.insert(&mut txn, "d", "leaf");
    }
    let report = session.flush().unwrap();

    assert_eq!(report.notifications, 1);
    assert_eq!(
        session.mirror().to_json(),
        json!({ "a": { "b": { "c": 1 }, "d": "leaf" } })
    );
    assert_eq!(session.controller_count(), 3);
}

#[test]
fn test_remote_batches_reconcile_in_commit_order() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let root = root_map_ref(&doc);

    for value in ["first", "second", "third"] {
        let mut txn = doc.transact_mut();
        root.insert(&mut txn, "k", value);
    }
    assert!(session.has_pending());
    let report = session.flush().unwrap();

    assert_eq!(report.notifications, 3);
    assert_eq!(mirror_map(&session).get("k").unwrap(), "third");
}

#[test]
fn test_remote_changes_are_not_echoed() {
    let doc = Doc::new();
    let counter = NotificationCounter::on_map(&root_map_ref(&doc));
    let mut session = map_session(&doc);

    {
        let root = root_map_ref(&doc);
        let mut txn = doc.transact_mut();
        root.insert(&mut txn, "remote", 1.0);
    }
    session.flush().unwrap();
    assert!(!session.has_pending());

    let report = session.flush().unwrap();
    assert!(!report.committed);
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_local_echo_is_idempotent() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);
    let nested: MapNode = [("k", "v")].into_iter().collect();

    state.set("nested", nested.clone()).unwrap();
    state.set("leaf", 1).unwrap();
    let report = session.flush().unwrap();

    assert_eq!(report.notifications, 1);
    assert_eq!(report.mirror_changes, 0);
    assert!(child_map(&state, "nested").ptr_eq(&nested));
    assert!(!session.has_pending());
}
