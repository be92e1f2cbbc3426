//! Ordered containers: inserts, splices, moves and remote range deltas.

use serde_json::json;
use ymirror::{
    ListNode, MapNode, Value,
    y_crdt::{Array, Doc, Map, MapPrelim, Transact},
};

use crate::helpers::*;

/// List root holding `{"id": name}` maps, flushed.
fn seeded_items(doc: &Doc, names: &[&str]) -> (ymirror::SyncSession, Vec<MapNode>) {
    let mut session = list_session(doc);
    let list = mirror_list(&session);
    let items: Vec<MapNode> = names
        .iter()
        .map(|name| [("id", *name)].into_iter().collect())
        .collect();
    list.extend(items.iter().cloned()).unwrap();
    session.flush().unwrap();
    (session, items)
}

fn ids(list: &ListNode) -> Vec<String> {
    list.items()
        .iter()
        .map(|item| {
            item.as_map()
                .and_then(|map| map.get("id"))
                .and_then(|id| id.as_str().map(str::to_string))
                .unwrap_or_default()
        })
        .collect()
}

#[test]
fn test_push_and_splice() {
    let doc = Doc::new();
    let mut session = list_session(&doc);
    let list = mirror_list(&session);

    list.push(1).unwrap();
    list.push("two").unwrap();
    list.unshift(Value::Null).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session), json!([null, 1, "two"]));

    let removed = list
        .splice(1, 1, vec![Value::from("a"), Value::from("b")])
        .unwrap();
    assert_eq!(removed, vec![Value::from(1)]);
    session.flush().unwrap();
    assert_eq!(doc_json(&session), json!([null, "a", "b", "two"]));
}

#[test]
fn test_index_assignment_replaces_item() {
    let doc = Doc::new();
    let (mut session, items) = seeded_items(&doc, &["a", "b", "c"]);
    let list = mirror_list(&session);

    let replacement: MapNode = [("id", "z")].into_iter().collect();
    let old = list.set(1, replacement.clone()).unwrap();
    session.flush().unwrap();

    assert!(old.as_map().unwrap().ptr_eq(&items[1]));
    assert!(!items[1].is_attached());
    assert!(item_map(&list, 1).ptr_eq(&replacement));
    assert_eq!(doc_json(&session), json!([{ "id": "a" }, { "id": "z" }, { "id": "c" }]));
    assert_eq!(session.controller_count(), 4);
}

#[test]
fn test_move_up_keeps_identities() {
    let doc = Doc::new();
    let (mut session, items) = seeded_items(&doc, &["a", "b", "c", "d"]);
    let list = mirror_list(&session);

    let moved = list.remove(2).unwrap();
    list.insert(1, moved).unwrap();
    session.flush().unwrap();

    assert_eq!(ids(&list), vec!["a", "c", "b", "d"]);
    assert_eq!(
        doc_json(&session),
        json!([{ "id": "a" }, { "id": "c" }, { "id": "b" }, { "id": "d" }])
    );
    assert!(item_map(&list, 0).ptr_eq(&items[0]));
    assert!(item_map(&list, 1).ptr_eq(&items[2]));
    assert!(item_map(&list, 2).ptr_eq(&items[1]));
    assert!(item_map(&list, 3).ptr_eq(&items[3]));

    // The moved node is bound to its new container.
    items[2].set("moved", true).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session)[1], json!({ "id": "c", "moved": true }));
    assert_eq!(session.controller_count(), 5);
}

#[test]
fn test_move_down_keeps_identities() {
    let doc = Doc::new();
    let (mut session, items) = seeded_items(&doc, &["a", "b", "c", "d"]);
    let list = mirror_list(&session);

    let moved = list.remove(0).unwrap();
    list.insert(2, moved).unwrap();
    session.flush().unwrap();

    assert_eq!(ids(&list), vec!["b", "c", "a", "d"]);
    assert_in_sync(&session);
    assert!(item_map(&list, 0).ptr_eq(&items[1]));
    assert!(item_map(&list, 2).ptr_eq(&items[0]));
}

#[test]
fn test_splice_clear_and_shrink() {
    let doc = Doc::new();
    let (mut session, _) = seeded_items(&doc, &["a", "b", "c", "d"]);
    let list = mirror_list(&session);

    list.splice(1, 2, Vec::new()).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session), json!([{ "id": "a" }, { "id": "d" }]));
    assert_eq!(session.controller_count(), 3);

    list.splice(0, list.len(), Vec::new()).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session), json!([]));
    assert_eq!(session.controller_count(), 1);
}

#[test]
fn test_mirror_index_out_of_range() {
    let doc = Doc::new();
    let (session, _) = seeded_items(&doc, &["a"]);
    let list = mirror_list(&session);

    assert!(list.remove(3).unwrap_err().is_out_of_bounds());
    assert!(list.set(1, "x").unwrap_err().is_out_of_bounds());
    assert!(list.insert(5, "x").unwrap_err().is_out_of_bounds());
    assert!(!session.has_pending());
}

#[test]
fn test_remote_range_changes_keep_siblings() {
    let doc = Doc::new();
    let (mut session, items) = seeded_items(&doc, &["a", "b", "c", "d"]);
    let list = mirror_list(&session);

    {
        let array = root_array_ref(&doc);
        let mut txn = doc.transact_mut();
        array.remove_range(&mut txn, 2, 1);
        array.insert(&mut txn, 1, "inserted");
    }
    let report = session.flush().unwrap();

    assert_eq!(report.notifications, 1);
    assert_eq!(list.len(), 4);
    assert!(item_map(&list, 0).ptr_eq(&items[0]));
    assert_eq!(list.get(1).unwrap(), "inserted");
    assert!(item_map(&list, 2).ptr_eq(&items[1]));
    assert!(item_map(&list, 3).ptr_eq(&items[3]));
    assert!(!items[2].is_attached());
    assert_in_sync(&session);
}

#[test]
fn test_remote_nested_insert_materializes_controller() {
    let doc = Doc::new();
    let (mut session, _) = seeded_items(&doc, &["a"]);
    let list = mirror_list(&session);

    {
        let array = root_array_ref(&doc);
        let mut txn = doc.transact_mut();
        let item = array.insert(&mut txn, 1, MapPrelim::default());
        item.insert(&mut txn, "id", "remote");
    }
    session.flush().unwrap();

    assert_eq!(ids(&list), vec!["a", "remote"]);
    assert_eq!(session.controller_count(), 3);

    item_map(&list, 1).set("seen", true).unwrap();
    session.flush().unwrap();
    assert_eq!(doc_json(&session)[1], json!({ "id": "remote", "seen": true }));
}

#[test]
fn test_delete_of_remotely_deleted_item_converges() {
    let doc = Doc::new();
    let mut session = list_session(&doc);
    let list = mirror_list(&session);
    list.extend(["a", "b", "c"]).unwrap();
    session.flush().unwrap();

    {
        let array = root_array_ref(&doc);
        let mut txn = doc.transact_mut();
        array.remove_range(&mut txn, 1, 2);
    }
    list.remove(2).unwrap();

    let report = session.flush().unwrap();
    assert_eq!(report.local_operations, 0);
    assert_eq!(doc_json(&session), json!(["a"]));
    assert_eq!(list.to_json(), json!(["a"]));
}
