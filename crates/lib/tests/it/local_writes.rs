//! Local mutations reaching the shared document.

use serde_json::json;
use ymirror::{
    FlushReport, ListNode, MapNode, Value,
    y_crdt::{Doc, Map, Out, Transact},
};

use crate::helpers::*;

#[test]
fn test_map_set_reaches_document() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);

    state.set("title", "draft").unwrap();
    assert_eq!(doc_json(&session), json!({}));

    let report = session.flush().unwrap();
    assert!(report.committed);
    assert_eq!(report.local_operations, 1);
    assert_eq!(doc_json(&session), json!({ "title": "draft" }));
}

#[test]
fn test_batched_writes_produce_single_notification() {
    let doc = Doc::new();
    let counter = NotificationCounter::on_map(&root_map_ref(&doc));
    let mut session = map_session(&doc);
    let state = mirror_map(&session);

    state.set("a", 1).unwrap();
    state.set("b", "two").unwrap();
    state.set("c", true).unwrap();
    session.flush().unwrap();

    assert_eq!(counter.count(), 1);
    assert_eq!(doc_json(&session), json!({ "a": 1, "b": "two", "c": true }));
}

#[test]
fn test_flush_without_changes_is_empty() {
    let doc = Doc::new();
    let counter = NotificationCounter::on_map(&root_map_ref(&doc));
    let mut session = map_session(&doc);

    assert_eq!(session.flush().unwrap(), FlushReport::default());
    assert_eq!(counter.count(), 0);
}

#[test]
fn test_undefined_rejected_and_null_stored() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);
    let profile = MapNode::new();
    state.set("profile", profile.clone()).unwrap();
    session.flush().unwrap();

    let err = profile.set("nickname", Value::Undefined).unwrap_err();
    assert!(err.is_undefined_value());
    assert!(!profile.contains_key("nickname"));
    assert!(!session.has_pending());

    profile.set("nickname", Value::Null).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session), json!({ "profile": { "nickname": null } }));
}

#[test]
fn test_nested_undefined_reports_path() {
    let doc = Doc::new();
    let session = map_session(&doc);
    let state = mirror_map(&session);

    let inner: MapNode = [("field", Value::Undefined)].into_iter().collect();
    let outer: MapNode = [("nested", inner)].into_iter().collect();
    let err = state.set("root", outer).unwrap_err();

    assert!(err.is_undefined_value());
    assert!(err.to_string().contains("root.nested.field"));
    assert!(state.is_empty());
}

#[test]
fn test_nested_structures_become_containers() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);

    let tags: ListNode = ["a", "b"].into_iter().collect();
    let settings: MapNode = [("theme", Value::from("dark")), ("tags", Value::from(tags))]
        .into_iter()
        .collect();
    state.set("settings", settings.clone()).unwrap();
    session.flush().unwrap();

    assert_eq!(
        doc_json(&session),
        json!({ "settings": { "theme": "dark", "tags": ["a", "b"] } })
    );
    // root, settings and tags
    assert_eq!(session.controller_count(), 3);

    let shared = shared_child_map(&doc, "settings");
    let txn = doc.transact();
    assert!(matches!(shared.get(&txn, "tags"), Some(Out::YArray(_))));
}

#[test]
fn test_nested_mutation_after_flush_keeps_identity() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);
    let settings: MapNode = [("theme", "dark")].into_iter().collect();
    state.set("settings", settings.clone()).unwrap();
    session.flush().unwrap();

    settings.set("theme", "light").unwrap();
    let report = session.flush().unwrap();

    assert_eq!(report.local_operations, 1);
    assert!(child_map(&state, "settings").ptr_eq(&settings));
    assert_eq!(doc_json(&session), json!({ "settings": { "theme": "light" } }));
}

#[test]
fn test_mutations_on_fresh_node_in_same_tick() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);

    let child = MapNode::new();
    state.set("child", child.clone()).unwrap();
    child.set("a", 1).unwrap();
    child.set("b", 2).unwrap();
    child.remove("a");
    session.flush().unwrap();

    assert_eq!(doc_json(&session), json!({ "child": { "b": 2 } }));
    assert_in_sync(&session);
}

#[test]
fn test_delete_key() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);
    state.set("keep", 1).unwrap();
    state.set("drop", MapNode::new()).unwrap();
    session.flush().unwrap();
    assert_eq!(session.controller_count(), 2);

    state.remove("drop");
    session.flush().unwrap();

    assert_eq!(doc_json(&session), json!({ "keep": 1 }));
    assert_eq!(session.controller_count(), 1);
}

#[test]
fn test_overwriting_nested_with_leaf_retires_controller() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);
    let list: ListNode = [MapNode::new(), MapNode::new()].into_iter().collect();
    state.set("items", list).unwrap();
    session.flush().unwrap();
    assert_eq!(session.controller_count(), 4);

    state.set("items", "gone").unwrap();
    session.flush().unwrap();

    assert_eq!(session.controller_count(), 1);
    assert_eq!(doc_json(&session), json!({ "items": "gone" }));
}

#[test]
fn test_removed_node_can_be_reinserted() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    let state = mirror_map(&session);
    let node: MapNode = [("v", 1)].into_iter().collect();
    state.set("a", node.clone()).unwrap();
    session.flush().unwrap();

    let err = state.set("b", node.clone()).unwrap_err();
    assert!(err.is_placement_error());

    let moved = state.remove("a").unwrap();
    state.set("b", moved).unwrap();
    session.flush().unwrap();

    assert!(child_map(&state, "b").ptr_eq(&node));
    assert_eq!(doc_json(&session), json!({ "b": { "v": 1 } }));

    node.set("v", 2).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session), json!({ "b": { "v": 2 } }));
}
