//! Shared-document adapter over `yrs`.
//!
//! Everything the sync core needs from the CRDT side goes through this
//! module: container handles and their identity, deep snapshots of
//! container content, and change notifications captured from a deep
//! observer.
//!
//! Change notifications are captured *inside* the observer callback, while
//! the committing transaction is still readable. Inserted containers are
//! snapshotted there, so a notification describes the document exactly as
//! of its own commit even when it is reconciled later.

use std::{fmt, sync::Arc};

use yrs::{
    Any, Array, ArrayRef, Map, MapRef, Origin, Out, ReadTxn, TransactionMut,
    branch::{Branch, BranchID},
    types::{Change, EntryChange, Event, Events},
};

use crate::mirror::{ListNode, MapNode, Value};

/// Identity of a shared container.
pub type ContainerId = BranchID;

/// Shape of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Key-addressed container (`Y.Map`)
    Keyed,
    /// Position-addressed container (`Y.Array`)
    Ordered,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Keyed => write!(f, "keyed"),
            ContainerKind::Ordered => write!(f, "ordered"),
        }
    }
}

/// Handle to a shared map or array.
#[derive(Clone)]
pub enum SharedContainer {
    Map(MapRef),
    List(ArrayRef),
}

impl SharedContainer {
    pub fn id(&self) -> ContainerId {
        match self {
            SharedContainer::Map(map) => branch_id(map),
            SharedContainer::List(array) => branch_id(array),
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            SharedContainer::Map(_) => ContainerKind::Keyed,
            SharedContainer::List(_) => ContainerKind::Ordered,
        }
    }

    /// Number of entries or items.
    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        match self {
            SharedContainer::Map(map) => map.len(txn),
            SharedContainer::List(array) => array.len(txn),
        }
    }

    /// Deep snapshot of the container's current content.
    pub fn snapshot<T: ReadTxn>(&self, txn: &T) -> Snapshot {
        match self {
            SharedContainer::Map(map) => Snapshot::Map {
                entries: map_entries(txn, map),
                container: map.clone(),
            },
            SharedContainer::List(array) => Snapshot::List {
                items: array.iter(txn).map(|out| Snapshot::capture(txn, out)).collect(),
                container: array.clone(),
            },
        }
    }
}

impl fmt::Debug for SharedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedContainer")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .finish()
    }
}

impl From<MapRef> for SharedContainer {
    fn from(map: MapRef) -> Self {
        SharedContainer::Map(map)
    }
}

impl From<ArrayRef> for SharedContainer {
    fn from(array: ArrayRef) -> Self {
        SharedContainer::List(array)
    }
}

fn branch_id<T: AsRef<Branch>>(shared: &T) -> ContainerId {
    shared.as_ref().id()
}

/// Identity of the container held in a document slot, if it holds one.
pub(crate) fn out_container_id(out: &Out) -> Option<ContainerId> {
    match out {
        Out::YMap(map) => Some(branch_id(map)),
        Out::YArray(array) => Some(branch_id(array)),
        _ => None,
    }
}

fn map_entries<T: ReadTxn>(txn: &T, map: &MapRef) -> Vec<(Arc<str>, Snapshot)> {
    let mut entries: Vec<(Arc<str>, Snapshot)> = map
        .iter(txn)
        .map(|(key, out)| (Arc::from(key), Snapshot::capture(txn, out)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Content of a document slot, captured at a specific commit.
#[derive(Clone)]
pub enum Snapshot {
    /// Primitive or embedded plain value
    Leaf(Any),
    /// Nested map with its entries
    Map {
        container: MapRef,
        entries: Vec<(Arc<str>, Snapshot)>,
    },
    /// Nested array with its items
    List {
        container: ArrayRef,
        items: Vec<Snapshot>,
    },
    /// Text, XML or sub-document content; not mirrored
    Unsupported,
}

impl Snapshot {
    pub(crate) fn capture<T: ReadTxn>(txn: &T, out: Out) -> Self {
        match out {
            Out::Any(any) => Snapshot::Leaf(any),
            Out::YMap(map) => SharedContainer::Map(map).snapshot(txn),
            Out::YArray(array) => SharedContainer::List(array).snapshot(txn),
            _ => Snapshot::Unsupported,
        }
    }

    /// Identity of the captured container, if this is one.
    pub fn container_id(&self) -> Option<ContainerId> {
        match self {
            Snapshot::Map { container, .. } => Some(branch_id(container)),
            Snapshot::List { container, .. } => Some(branch_id(container)),
            _ => None,
        }
    }

    /// Converts the snapshot into fresh, unbound mirror values.
    pub fn to_value(&self) -> Value {
        match self {
            Snapshot::Leaf(any) => Value::from(any.clone()),
            Snapshot::Map { entries, .. } => Value::Map(
                entries
                    .iter()
                    .map(|(key, snapshot)| (key.clone(), snapshot.to_value()))
                    .collect::<MapNode>(),
            ),
            Snapshot::List { items, .. } => {
                Value::List(items.iter().map(Snapshot::to_value).collect::<ListNode>())
            }
            Snapshot::Unsupported => Value::Null,
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Leaf(any) => f.debug_tuple("Leaf").field(any).finish(),
            Snapshot::Map { container, entries } => f
                .debug_struct("Map")
                .field("id", &branch_id(container))
                .field("entries", entries)
                .finish(),
            Snapshot::List { container, items } => f
                .debug_struct("List")
                .field("id", &branch_id(container))
                .field("items", items)
                .finish(),
            Snapshot::Unsupported => write!(f, "Unsupported"),
        }
    }
}

/// Change of a single key in a keyed container.
#[derive(Debug, Clone)]
pub enum KeyChange {
    /// Key inserted or updated to the captured value
    Set(Snapshot),
    Removed,
}

/// One step of an ordered-container delta.
///
/// Steps are relative to the result of the previous steps: `Retain`
/// advances the cursor, `Delete` removes at the cursor, `Insert` inserts at
/// the cursor and advances past the inserted items.
#[derive(Debug, Clone)]
pub enum RangeOp {
    Retain(u32),
    Delete(u32),
    Insert(Vec<Snapshot>),
}

/// The change to one container.
#[derive(Debug, Clone)]
pub enum DeltaBody {
    Keyed(Vec<(Arc<str>, KeyChange)>),
    Ordered(Vec<RangeOp>),
}

impl DeltaBody {
    /// A delta that fills an empty container with `snapshot`'s content.
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Option<Self> {
        match snapshot {
            Snapshot::Map { entries, .. } => Some(DeltaBody::Keyed(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, KeyChange::Set(value)))
                    .collect(),
            )),
            Snapshot::List { items, .. } => Some(DeltaBody::Ordered(vec![RangeOp::Insert(items)])),
            _ => None,
        }
    }
}

/// Delta for one container within a committed transaction.
#[derive(Debug, Clone)]
pub struct ContainerDelta {
    pub target: ContainerId,
    /// Distance from the observed root; parents sort before children.
    pub depth: usize,
    pub body: DeltaBody,
}

/// Everything one committed transaction changed below the observed root.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    /// True when the transaction carried this session's local origin.
    pub local: bool,
    pub deltas: Vec<ContainerDelta>,
}

impl ChangeNotification {
    /// Captures the events of a committing transaction.
    pub(crate) fn capture(txn: &TransactionMut, events: &Events, local_origin: &Origin) -> Self {
        let local = txn.origin() == Some(local_origin);
        let mut deltas: Vec<ContainerDelta> = events
            .iter()
            .filter_map(|event| capture_event(txn, event))
            .collect();
        deltas.sort_by_key(|delta| delta.depth);
        ChangeNotification { local, deltas }
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

fn capture_event(txn: &TransactionMut, event: &Event) -> Option<ContainerDelta> {
    let depth = event.path().len();
    match event {
        Event::Map(map_event) => {
            let mut changes: Vec<(Arc<str>, KeyChange)> = map_event
                .keys(txn)
                .iter()
                .map(|(key, change)| {
                    let change = match change {
                        EntryChange::Inserted(new) | EntryChange::Updated(_, new) => {
                            KeyChange::Set(Snapshot::capture(txn, new.clone()))
                        }
                        EntryChange::Removed(_) => KeyChange::Removed,
                    };
                    (key.clone(), change)
                })
                .collect();
            changes.sort_by(|a, b| a.0.cmp(&b.0));
            Some(ContainerDelta {
                target: branch_id(map_event.target()),
                depth,
                body: DeltaBody::Keyed(changes),
            })
        }
        Event::Array(array_event) => {
            let ops = array_event
                .delta(txn)
                .iter()
                .map(|change| match change {
                    Change::Retain(len) => RangeOp::Retain(*len),
                    Change::Removed(len) => RangeOp::Delete(*len),
                    Change::Added(values) => RangeOp::Insert(
                        values
                            .iter()
                            .map(|out| Snapshot::capture(txn, out.clone()))
                            .collect(),
                    ),
                })
                .collect();
            Some(ContainerDelta {
                target: branch_id(array_event.target()),
                depth,
                body: DeltaBody::Ordered(ops),
            })
        }
        _ => None,
    }
}
