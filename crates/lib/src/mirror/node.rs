//! Keyed and ordered mirror nodes.
//!
//! Nodes are reference-counted handles: cloning a [`MapNode`] or
//! [`ListNode`] yields another handle to the same node, and node identity
//! is handle identity. The reconciler relies on this to keep untouched
//! subtrees identical across synchronization passes.
//!
//! A node is either detached (freshly built, or removed from its parent)
//! or attached to exactly one parent. Only nodes reachable from a mirror
//! root carry a journal link, so only their mutations are recorded.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashSet},
    fmt,
    rc::{Rc, Weak},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use yrs::Any;

use super::{
    Journal, MirrorError, Value,
    journal::LocalOp,
    value::any_map,
};
use crate::Result;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a mirror node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Link {
    journal: Option<Weak<Journal>>,
    attached: bool,
}

impl Link {
    fn journal(&self) -> Option<Rc<Journal>> {
        self.journal.as_ref().and_then(Weak::upgrade)
    }
}

struct MapInner {
    id: NodeId,
    entries: BTreeMap<Arc<str>, Value>,
    link: Link,
}

struct ListInner {
    id: NodeId,
    items: Vec<Value>,
    link: Link,
}

/// Observable keyed structure.
#[derive(Clone)]
pub struct MapNode(Rc<RefCell<MapInner>>);

/// Observable ordered structure.
#[derive(Clone)]
pub struct ListNode(Rc<RefCell<ListInner>>);

impl PartialEq for MapNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl PartialEq for ListNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for MapNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("MapNode")
            .field("id", &inner.id)
            .field("entries", &inner.entries)
            .finish()
    }
}

impl fmt::Debug for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("ListNode")
            .field("id", &inner.id)
            .field("items", &inner.items)
            .finish()
    }
}

impl Default for MapNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ListNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MapNode {
    /// Creates an empty, detached map node.
    pub fn new() -> Self {
        MapNode(Rc::new(RefCell::new(MapInner {
            id: NodeId::next(),
            entries: BTreeMap::new(),
            link: Link::default(),
        })))
    }

    /// Creates a root node whose mutations are recorded in `journal`.
    pub(crate) fn new_root(journal: &Rc<Journal>) -> Self {
        let node = Self::new();
        {
            let mut inner = node.0.borrow_mut();
            inner.link.attached = true;
            inner.link.journal = Some(Rc::downgrade(journal));
        }
        node
    }

    pub fn id(&self) -> NodeId {
        self.0.borrow().id
    }

    /// Returns true if both handles point at the same node.
    pub fn ptr_eq(&self, other: &MapNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns true if the node has a parent or is a mirror root.
    pub fn is_attached(&self) -> bool {
        self.0.borrow().link.attached
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().entries.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<Arc<str>> {
        self.0.borrow().entries.keys().cloned().collect()
    }

    /// Snapshot of all entries in key order.
    pub fn entries(&self) -> Vec<(Arc<str>, Value)> {
        self.0
            .borrow()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Assigns `value` to `key`, returning the previous value.
    ///
    /// Fails without touching the node if `value` contains `Undefined`, or
    /// if it is a node that is already attached elsewhere.
    pub fn set(&self, key: impl Into<Arc<str>>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        let value = value.into();
        check_insertable(self.id(), &value, &key)?;

        let previous = self.apply_set(key.clone(), value.clone());
        self.record(LocalOp::MapSet { key, value });
        Ok(previous)
    }

    /// Removes `key`, returning the removed value. The removed node (if
    /// any) becomes detached and may be inserted elsewhere.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let previous = self.apply_remove(key)?;
        self.record(LocalOp::MapDelete { key: key.into() });
        Some(previous)
    }

    pub fn to_any(&self) -> Any {
        any_map(self.0.borrow().entries.iter())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .borrow()
                .entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_json()))
                .collect(),
        )
    }

    /// Sets without validation or recording.
    pub(crate) fn apply_set(&self, key: Arc<str>, value: Value) -> Option<Value> {
        let journal = self.0.borrow().link.journal.clone();
        adopt(&value, journal.as_ref());
        let previous = self.0.borrow_mut().entries.insert(key, value.clone());
        if let Some(old) = previous.as_ref().filter(|old| !same_node(old, &value)) {
            release(old);
        }
        previous
    }

    /// Removes without recording.
    pub(crate) fn apply_remove(&self, key: &str) -> Option<Value> {
        let previous = self.0.borrow_mut().entries.remove(key);
        if let Some(old) = &previous {
            release(old);
        }
        previous
    }

    fn relink(&self, journal: Option<&Weak<Journal>>) {
        let children: Vec<Value> = {
            let mut inner = self.0.borrow_mut();
            inner.link.journal = journal.cloned();
            inner.entries.values().cloned().collect()
        };
        children.iter().for_each(|child| relink_value(child, journal));
    }

    fn set_attached(&self, attached: bool) {
        self.0.borrow_mut().link.attached = attached;
    }

    fn record(&self, op: LocalOp) {
        let (id, journal) = {
            let inner = self.0.borrow();
            (inner.id, inner.link.journal())
        };
        if let Some(journal) = journal {
            journal.record(id, op);
        }
    }
}

impl ListNode {
    /// Creates an empty, detached list node.
    pub fn new() -> Self {
        ListNode(Rc::new(RefCell::new(ListInner {
            id: NodeId::next(),
            items: Vec::new(),
            link: Link::default(),
        })))
    }

    /// Creates a root node whose mutations are recorded in `journal`.
    pub(crate) fn new_root(journal: &Rc<Journal>) -> Self {
        let node = Self::new();
        {
            let mut inner = node.0.borrow_mut();
            inner.link.attached = true;
            inner.link.journal = Some(Rc::downgrade(journal));
        }
        node
    }

    pub fn id(&self) -> NodeId {
        self.0.borrow().id
    }

    /// Returns true if both handles point at the same node.
    pub fn ptr_eq(&self, other: &ListNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns true if the node has a parent or is a mirror root.
    pub fn is_attached(&self) -> bool {
        self.0.borrow().link.attached
    }

    pub fn len(&self) -> usize {
        self.0.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().items.get(index).cloned()
    }

    /// Snapshot of all items in order.
    pub fn items(&self) -> Vec<Value> {
        self.0.borrow().items.clone()
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        self.insert(self.len(), value)
    }

    pub fn unshift(&self, value: impl Into<Value>) -> Result<()> {
        self.insert(0, value)
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.splice(index, 0, vec![value.into()]).map(|_| ())
    }

    /// Appends all `values` as one insertion.
    pub fn extend<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        let values = values.into_iter().map(Into::into).collect();
        self.splice(self.len(), 0, values).map(|_| ())
    }

    /// Replaces the item at `index`, returning the old item.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<Value> {
        let value = value.into();
        let len = self.len();
        if index >= len {
            return Err(MirrorError::IndexOutOfBounds { index, len }.into());
        }
        check_insertable(self.id(), &value, &index.to_string())?;

        let previous = self.apply_replace(index, value.clone()).unwrap_or(Value::Null);
        self.record(LocalOp::ListReplace { index, value });
        Ok(previous)
    }

    pub fn remove(&self, index: usize) -> Result<Value> {
        let len = self.len();
        if index >= len {
            return Err(MirrorError::IndexOutOfBounds { index, len }.into());
        }
        let mut removed = self.splice(index, 1, Vec::new())?;
        Ok(removed.pop().unwrap_or(Value::Null))
    }

    pub fn pop(&self) -> Option<Value> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.remove(len - 1).ok()
    }

    pub fn shift(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        self.remove(0).ok()
    }

    /// Removes `delete_count` items starting at `start` and inserts `items`
    /// in their place, returning the removed items.
    ///
    /// `delete_count` is clamped to the end of the list. A splice records a
    /// range deletion followed by a range insertion, so the document sees
    /// the same two steps.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Result<Vec<Value>> {
        let len = self.len();
        if start > len {
            return Err(MirrorError::IndexOutOfBounds { index: start, len }.into());
        }
        let delete_count = delete_count.min(len - start);

        let owner = self.id();
        let mut seen = HashSet::new();
        for (offset, item) in items.iter().enumerate() {
            check_insertable(owner, item, &(start + offset).to_string())?;
            if let Some(id) = node_id(item).filter(|id| !seen.insert(*id)) {
                return Err(MirrorError::AlreadyAttached { node: id.as_u64() }.into());
            }
        }

        let removed = self.apply_remove_range(start, delete_count);
        if delete_count > 0 {
            self.record(LocalOp::ListDelete {
                index: start,
                count: delete_count,
            });
        }
        if !items.is_empty() {
            self.apply_insert(start, items.clone());
            self.record(LocalOp::ListInsert {
                index: start,
                values: items,
            });
        }
        Ok(removed)
    }

    pub fn to_any(&self) -> Any {
        let items: Vec<Any> = self.0.borrow().items.iter().map(Value::to_any).collect();
        Any::Array(items.into())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.borrow().items.iter().map(Value::to_json).collect())
    }

    /// Inserts without validation or recording. `index` is clamped.
    pub(crate) fn apply_insert(&self, index: usize, values: Vec<Value>) {
        let journal = self.0.borrow().link.journal.clone();
        values.iter().for_each(|value| adopt(value, journal.as_ref()));
        let mut inner = self.0.borrow_mut();
        let index = index.min(inner.items.len());
        inner.items.splice(index..index, values);
    }

    /// Removes without recording. The range is clamped.
    pub(crate) fn apply_remove_range(&self, index: usize, count: usize) -> Vec<Value> {
        let removed: Vec<Value> = {
            let mut inner = self.0.borrow_mut();
            let len = inner.items.len();
            let start = index.min(len);
            let end = start.saturating_add(count).min(len);
            inner.items.drain(start..end).collect()
        };
        removed.iter().for_each(release);
        removed
    }

    /// Replaces without validation or recording. Appends if `index` is past
    /// the end.
    pub(crate) fn apply_replace(&self, index: usize, value: Value) -> Option<Value> {
        let journal = self.0.borrow().link.journal.clone();
        adopt(&value, journal.as_ref());
        let previous = {
            let mut inner = self.0.borrow_mut();
            match inner.items.get_mut(index) {
                Some(slot) => Some(std::mem::replace(slot, value.clone())),
                None => {
                    inner.items.push(value.clone());
                    None
                }
            }
        };
        if let Some(old) = previous.as_ref().filter(|old| !same_node(old, &value)) {
            release(old);
        }
        previous
    }

    fn relink(&self, journal: Option<&Weak<Journal>>) {
        let children: Vec<Value> = {
            let mut inner = self.0.borrow_mut();
            inner.link.journal = journal.cloned();
            inner.items.clone()
        };
        children.iter().for_each(|child| relink_value(child, journal));
    }

    fn set_attached(&self, attached: bool) {
        self.0.borrow_mut().link.attached = attached;
    }

    fn record(&self, op: LocalOp) {
        let (id, journal) = {
            let inner = self.0.borrow();
            (inner.id, inner.link.journal())
        };
        if let Some(journal) = journal {
            journal.record(id, op);
        }
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for MapNode {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let node = MapNode::new();
        for (key, value) in iter {
            node.apply_set(key.into(), value.into());
        }
        node
    }
}

impl<V: Into<Value>> FromIterator<V> for ListNode {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let node = ListNode::new();
        let values = iter.into_iter().map(Into::into).collect();
        node.apply_insert(0, values);
        node
    }
}

fn node_id(value: &Value) -> Option<super::NodeId> {
    match value {
        Value::Map(node) => Some(node.id()),
        Value::List(node) => Some(node.id()),
        _ => None,
    }
}

fn same_node(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
        (Value::List(a), Value::List(b)) => a.ptr_eq(b),
        _ => false,
    }
}

fn check_insertable(owner: NodeId, value: &Value, path: &str) -> std::result::Result<(), MirrorError> {
    value.ensure_storable(path)?;
    let attached = match value {
        Value::Map(node) => node.is_attached(),
        Value::List(node) => node.is_attached(),
        _ => return Ok(()),
    };
    let id = node_id(value).map(NodeId::as_u64).unwrap_or_default();
    if attached {
        return Err(MirrorError::AlreadyAttached { node: id });
    }
    if value.contains_node(owner) {
        return Err(MirrorError::CycleDetected { node: id });
    }
    Ok(())
}

fn adopt(value: &Value, journal: Option<&Weak<Journal>>) {
    match value {
        Value::Map(node) => node.set_attached(true),
        Value::List(node) => node.set_attached(true),
        _ => return,
    }
    relink_value(value, journal);
}

fn release(value: &Value) {
    match value {
        Value::Map(node) => node.set_attached(false),
        Value::List(node) => node.set_attached(false),
        _ => return,
    }
    relink_value(value, None);
}

fn relink_value(value: &Value, journal: Option<&Weak<Journal>>) {
    match value {
        Value::Map(node) => node.relink(journal),
        Value::List(node) => node.relink(journal),
        _ => {}
    }
}
