use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ymirror::{
    ListNode, MapNode, SyncOptions, SyncSession,
    y_crdt::{
        ArrayRef, DeepObservable, Doc, Map, MapRef, Out, ReadTxn, Subscription, Transact,
        Update, updates::decoder::Decode,
    },
};

pub const ROOT: &str = "root";

pub fn root_map_ref(doc: &Doc) -> MapRef {
    doc.get_or_insert_map(ROOT)
}

pub fn root_array_ref(doc: &Doc) -> ArrayRef {
    doc.get_or_insert_array(ROOT)
}

/// Session over the keyed root named [`ROOT`].
pub fn map_session(doc: &Doc) -> SyncSession {
    map_session_with(doc, SyncOptions::default())
}

pub fn map_session_with(doc: &Doc, options: SyncOptions) -> SyncSession {
    SyncSession::new(doc, |doc| root_map_ref(doc).into(), options)
        .expect("Failed to create map session")
}

/// Session over the ordered root named [`ROOT`].
pub fn list_session(doc: &Doc) -> SyncSession {
    SyncSession::new(doc, |doc| root_array_ref(doc).into(), SyncOptions::default())
        .expect("Failed to create list session")
}

pub fn mirror_map(session: &SyncSession) -> MapNode {
    session
        .mirror()
        .as_map()
        .expect("mirror root is not a map")
        .clone()
}

pub fn mirror_list(session: &SyncSession) -> ListNode {
    session
        .mirror()
        .as_list()
        .expect("mirror root is not a list")
        .clone()
}

pub fn child_map(map: &MapNode, key: &str) -> MapNode {
    map.get(key)
        .and_then(|value| value.as_map().cloned())
        .unwrap_or_else(|| panic!("'{key}' is not a map"))
}

pub fn child_list(map: &MapNode, key: &str) -> ListNode {
    map.get(key)
        .and_then(|value| value.as_list().cloned())
        .unwrap_or_else(|| panic!("'{key}' is not a list"))
}

pub fn item_map(list: &ListNode, index: usize) -> MapNode {
    list.get(index)
        .and_then(|value| value.as_map().cloned())
        .unwrap_or_else(|| panic!("item {index} is not a map"))
}

/// JSON of the session root as stored in the document.
pub fn doc_json(session: &SyncSession) -> serde_json::Value {
    session
        .document_value()
        .expect("Failed to read document")
        .to_json()
}

pub fn assert_in_sync(session: &SyncSession) {
    assert_eq!(session.mirror().to_json(), doc_json(session));
}

/// Nested shared map stored at `key` of the document root.
pub fn shared_child_map(doc: &Doc, key: &str) -> MapRef {
    let root = root_map_ref(doc);
    let txn = doc.transact();
    match root.get(&txn, key) {
        Some(Out::YMap(map)) => map,
        other => panic!("'{key}' is not a shared map: {other:?}"),
    }
}

/// Nested shared array stored at `key` of the document root.
pub fn shared_child_array(doc: &Doc, key: &str) -> ArrayRef {
    let root = root_map_ref(doc);
    let txn = doc.transact();
    match root.get(&txn, key) {
        Some(Out::YArray(array)) => array,
        other => panic!("'{key}' is not a shared array: {other:?}"),
    }
}

/// Sends everything `to` is missing from `from`.
pub fn sync(from: &Doc, to: &Doc) {
    let state_vector = to.transact().state_vector();
    let update = from.transact().encode_state_as_update_v1(&state_vector);
    let mut txn = to.transact_mut();
    txn.apply_update(Update::decode_v1(&update).expect("Failed to decode update"))
        .expect("Failed to apply update");
}

pub fn exchange(a: &Doc, b: &Doc) {
    sync(a, b);
    sync(b, a);
}

pub fn assert_converged(a: &SyncSession, b: &SyncSession) {
    assert_in_sync(a);
    assert_in_sync(b);
    assert_eq!(a.mirror().to_json(), b.mirror().to_json());
}

/// Counts committed transactions touching the document root.
pub struct NotificationCounter {
    count: Arc<AtomicUsize>,
    _subscription: Subscription,
}

impl NotificationCounter {
    pub fn on_map(map: &MapRef) -> Self {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let subscription = map.observe_deep(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        Self {
            count,
            _subscription: subscription,
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
