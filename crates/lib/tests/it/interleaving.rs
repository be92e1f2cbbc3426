//! Local mutations and remote commits meeting in the same flush.
//!
//! In every test here a peer's change is queued while local records are
//! still journaled, so the batch is written against a document that has
//! already moved.

use serde_json::json;
use ymirror::{
    MapNode, Value,
    y_crdt::{Array, Doc, Map, MapPrelim, Transact},
};

use crate::helpers::*;

#[test]
fn test_local_push_after_remote_insert() {
    let doc = Doc::new();
    let mut session = list_session(&doc);
    let list = mirror_list(&session);
    list.extend(["a", "b"]).unwrap();
    session.flush().unwrap();

    {
        let array = root_array_ref(&doc);
        let mut txn = doc.transact_mut();
        array.insert(&mut txn, 0, "x");
    }
    list.push("c").unwrap();

    let report = session.flush().unwrap();
    assert_eq!(report.local_operations, 1);
    assert_eq!(doc_json(&session), json!(["x", "a", "b", "c"]));
    assert_in_sync(&session);

    // Nothing is left to repair.
    let report = session.flush().unwrap();
    assert_eq!(report.mirror_changes, 0);
    assert_in_sync(&session);
}

#[test]
fn test_remote_delete_keeps_unrelated_keyed_write() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    session
        .bootstrap(json!({ "items": ["a", "b", "c"], "title": "t" }))
        .unwrap();
    let state = mirror_map(&session);

    {
        let items = shared_child_array(&doc, "items");
        let mut txn = doc.transact_mut();
        items.remove_range(&mut txn, 1, 2);
    }
    child_list(&state, "items").push("d").unwrap();
    state.set("title", "unrelated").unwrap();

    session.flush().unwrap();
    assert_eq!(
        doc_json(&session),
        json!({ "items": ["a", "d"], "title": "unrelated" })
    );
    assert_in_sync(&session);
}

#[test]
fn test_index_set_and_splice_after_remote_delete() {
    let doc = Doc::new();
    let mut session = list_session(&doc);
    let list = mirror_list(&session);
    list.extend(["a", "b", "c", "d"]).unwrap();
    session.flush().unwrap();

    {
        let array = root_array_ref(&doc);
        let mut txn = doc.transact_mut();
        array.remove_range(&mut txn, 1, 1);
    }
    // `b` is gone from the document, so setting it re-inserts the value
    // where it was.
    list.set(1, "B").unwrap();
    list.splice(2, 1, vec![Value::from("C")]).unwrap();

    session.flush().unwrap();
    assert_eq!(doc_json(&session), json!(["a", "B", "C", "d"]));
    assert_in_sync(&session);
}

#[test]
fn test_local_delete_after_remote_insert_keeps_sibling_identity() {
    let doc = Doc::new();
    let mut session = list_session(&doc);
    let list = mirror_list(&session);
    let items: Vec<MapNode> = ["a", "b", "c"]
        .into_iter()
        .map(|id| [("id", id)].into_iter().collect())
        .collect();
    list.extend(items.iter().cloned()).unwrap();
    session.flush().unwrap();

    {
        let array = root_array_ref(&doc);
        let mut txn = doc.transact_mut();
        array.insert(&mut txn, 0, "x");
    }
    list.remove(0).unwrap();

    session.flush().unwrap();
    assert_eq!(
        doc_json(&session),
        json!(["x", { "id": "b" }, { "id": "c" }])
    );
    assert_in_sync(&session);
    assert!(item_map(&list, 1).ptr_eq(&items[1]));
    assert!(item_map(&list, 2).ptr_eq(&items[2]));
    assert!(!items[0].is_attached());

    // The kept nodes are still bound.
    items[2].set("done", true).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session)[2], json!({ "id": "c", "done": true }));
}

#[test]
fn test_local_edits_inside_remotely_replaced_map_are_dropped() {
    let doc = Doc::new();
    let mut session = map_session(&doc);
    session
        .bootstrap(json!({ "profile": { "name": "A", "tags": ["x"] }, "count": 1 }))
        .unwrap();
    let state = mirror_map(&session);
    let profile = child_map(&state, "profile");

    {
        let root = root_map_ref(&doc);
        let mut txn = doc.transact_mut();
        let replacement = root.insert(&mut txn, "profile", MapPrelim::default());
        replacement.insert(&mut txn, "name", "B");
    }
    profile.set("age", 3).unwrap();
    child_list(&profile, "tags").push("y").unwrap();
    state.set("count", 2).unwrap();

    let report = session.flush().unwrap();
    assert_eq!(report.local_operations, 1);
    assert_eq!(
        doc_json(&session),
        json!({ "profile": { "name": "B" }, "count": 2 })
    );
    assert_in_sync(&session);
    assert!(!child_map(&state, "profile").ptr_eq(&profile));
}

#[test]
fn test_peers_converge_with_pending_list_edits() {
    let doc_a = Doc::new();
    let doc_b = Doc::new();
    let mut a = list_session(&doc_a);
    let mut b = list_session(&doc_b);
    a.bootstrap(json!(["one", "two", "three"])).unwrap();
    sync(&doc_a, &doc_b);
    b.flush().unwrap();

    mirror_list(&a).unshift("front").unwrap();
    mirror_list(&a).remove(2).unwrap();
    a.flush().unwrap();
    sync(&doc_a, &doc_b);

    // b has not seen a's commit yet when it edits its own list.
    let list_b = mirror_list(&b);
    list_b.push("back").unwrap();
    list_b.set(1, "TWO").unwrap();
    list_b.remove(0).unwrap();
    b.flush().unwrap();
    assert_in_sync(&b);

    sync(&doc_b, &doc_a);
    a.flush().unwrap();
    assert_converged(&a, &b);
}

#[test]
fn test_interleaved_relay_converges_with_few_commits() {
    const ROUNDS: usize = 12;

    let doc_a = Doc::new();
    let doc_b = Doc::new();
    let mut a = map_session(&doc_a);
    let mut b = map_session(&doc_b);
    a.bootstrap(json!({ "items": [], "turn": 0 })).unwrap();
    sync(&doc_a, &doc_b);
    b.flush().unwrap();
    let commits = NotificationCounter::on_map(&root_map_ref(&doc_a));

    let state_a = mirror_map(&a);
    let state_b = mirror_map(&b);
    for round in 0..ROUNDS {
        child_list(&state_a, "items")
            .push(format!("a{round}"))
            .unwrap();
        state_a.set("turn", round as f64).unwrap();

        let items_b = child_list(&state_b, "items");
        items_b.unshift(format!("b{round}")).unwrap();
        if round % 3 == 2 {
            items_b.remove(items_b.len() - 1).unwrap();
        }

        // Each side flushes with the other's last commit still queued.
        sync(&doc_b, &doc_a);
        a.flush().unwrap();
        sync(&doc_a, &doc_b);
        b.flush().unwrap();
        assert_in_sync(&a);
        assert_in_sync(&b);
    }
    exchange(&doc_a, &doc_b);
    a.flush().unwrap();
    b.flush().unwrap();

    assert_converged(&a, &b);
    assert_eq!(
        child_list(&state_a, "items").len(),
        child_list(&state_b, "items").len()
    );
    // One local commit and at most one relayed update per round.
    assert!(commits.count() <= 2 * ROUNDS + 1);
}
