//! Remote apply path: document deltas to silent mirror mutations.
//!
//! Mirror nodes are only touched through their non-recording methods here,
//! so nothing applied from the document is journaled and sent back.

use std::{collections::HashSet, sync::Arc};

use yrs::{Any, ReadTxn};

use super::{Binding, ControllerId, ControllerTree, SlotOrigin};
use crate::{
    document::{DeltaBody, KeyChange, RangeOp, SharedContainer, Snapshot},
    logger::Logger,
    mirror::{ListNode, MapNode, Value},
    path::IgnoreMatcher,
};

pub(crate) struct RemoteContext<'a> {
    pub matcher: &'a IgnoreMatcher,
    pub log: &'a Logger,
    /// The notification carried this session's local origin.
    pub local: bool,
    /// Controllers materialized while reconciling the current notification.
    pub fresh: &'a mut HashSet<ControllerId>,
}

impl ControllerTree {
    /// Applies `body` to the mirror node bound by `id`.
    ///
    /// Returns the number of mirror slots that changed.
    pub(crate) fn apply_remote(
        &mut self,
        id: ControllerId,
        body: &DeltaBody,
        cx: &mut RemoteContext<'_>,
    ) -> usize {
        match (self.binding(id), body) {
            (Some(Binding::Map(_, node)), DeltaBody::Keyed(changes)) => {
                self.apply_keyed(id, &node, changes, cx)
            }
            (Some(Binding::List(_, node)), DeltaBody::Ordered(ops)) if cx.local => {
                self.repair_ordered(id, &node, ops, cx)
            }
            (Some(Binding::List(_, node)), DeltaBody::Ordered(ops)) => {
                self.apply_ordered(id, &node, ops, cx)
            }
            (Some(_), _) => {
                cx.log
                    .warn(format_args!("delta shape does not match the container of {id}"));
                0
            }
            (None, _) => 0,
        }
    }

    /// Sets or deletes exactly the listed keys. A key whose current mirror
    /// value is already equivalent is left alone.
    fn apply_keyed(
        &mut self,
        id: ControllerId,
        node: &MapNode,
        changes: &[(Arc<str>, KeyChange)],
        cx: &mut RemoteContext<'_>,
    ) -> usize {
        let mut changed = 0;
        for (key, change) in changes {
            if !cx.matcher.should_sync(&*self, id, key, cx.log) {
                continue;
            }
            match change {
                KeyChange::Set(snapshot) => {
                    let current = node.get(key);
                    if current.is_some_and(|current| self.is_equivalent(&current, snapshot)) {
                        continue;
                    }
                    let (value, child) =
                        self.materialize(snapshot, id, SlotOrigin::Key(key.clone()), cx);
                    node.apply_set(key.clone(), value);
                    self.set_keyed_child(id, key.clone(), child);
                    changed += 1;
                }
                KeyChange::Removed => {
                    if node.apply_remove(key).is_some() {
                        self.set_keyed_child(id, key.clone(), None);
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// Replays range operations in recorded order.
    fn apply_ordered(
        &mut self,
        id: ControllerId,
        node: &ListNode,
        ops: &[RangeOp],
        cx: &mut RemoteContext<'_>,
    ) -> usize {
        let mut changed = 0;
        let mut position = 0usize;
        for op in ops {
            match op {
                RangeOp::Retain(len) => position += *len as usize,
                RangeOp::Delete(len) => {
                    let len = *len as usize;
                    changed += node.apply_remove_range(position, len).len();
                    self.splice_children(id, position, len, Vec::new());
                }
                RangeOp::Insert(items) => {
                    let (values, children): (Vec<Value>, Vec<Option<ControllerId>>) = items
                        .iter()
                        .map(|snapshot| self.materialize(snapshot, id, SlotOrigin::Item, cx))
                        .unzip();
                    node.apply_insert(position, values);
                    self.splice_children(id, position, 0, children);
                    position += items.len();
                    changed += items.len();
                }
            }
        }
        changed
    }

    /// Checks the echo of a local transaction position by position.
    ///
    /// The mirror already holds the final state, so deletions need no work
    /// and each inserted item is only written when the mirror disagrees.
    fn repair_ordered(
        &mut self,
        id: ControllerId,
        node: &ListNode,
        ops: &[RangeOp],
        cx: &mut RemoteContext<'_>,
    ) -> usize {
        let mut changed = 0;
        let mut position = 0usize;
        for op in ops {
            match op {
                RangeOp::Retain(len) => position += *len as usize,
                RangeOp::Delete(_) => {}
                RangeOp::Insert(items) => {
                    for snapshot in items {
                        let current = node.get(position);
                        let in_sync = current
                            .as_ref()
                            .is_some_and(|current| self.is_equivalent(current, snapshot));
                        if !in_sync {
                            let (value, child) =
                                self.materialize(snapshot, id, SlotOrigin::Item, cx);
                            if current.is_some() {
                                node.apply_replace(position, value);
                                self.splice_children(id, position, 1, vec![child]);
                            } else {
                                node.apply_insert(position, vec![value]);
                                self.splice_children(id, position, 0, vec![child]);
                            }
                            changed += 1;
                        }
                        position += 1;
                    }
                }
            }
        }
        if changed > 0 {
            cx.log
                .debug(format_args!("repaired {changed} items of {id} after local commit"));
        }
        changed
    }

    /// Moves the child slots of an ordered controller over remote deltas
    /// the mirror has not seen yet, so that slots line up with document
    /// positions. Slots of remotely deleted items are disposed.
    pub(crate) fn replay_child_slots(&mut self, id: ControllerId, deltas: &[Vec<RangeOp>]) {
        for ops in deltas {
            let mut position = 0usize;
            for op in ops {
                match op {
                    RangeOp::Retain(len) => position += *len as usize,
                    RangeOp::Delete(len) => {
                        self.splice_children(id, position, *len as usize, Vec::new())
                    }
                    RangeOp::Insert(items) => {
                        self.splice_children(id, position, 0, vec![None; items.len()]);
                        position += items.len();
                    }
                }
            }
        }
    }

    /// Rebuilds the items of the ordered controller `id` from the document.
    ///
    /// Used for lists whose local and remote changes met in one flush,
    /// after their queued deltas were skipped. Nodes of containers that are
    /// still present keep their identity; only differing positions count
    /// as changes.
    pub(crate) fn realign_list<T: ReadTxn>(
        &mut self,
        txn: &T,
        id: ControllerId,
        cx: &mut RemoteContext<'_>,
    ) -> usize {
        let Some(Binding::List(array, node)) = self.binding(id) else {
            return 0;
        };
        let Snapshot::List { items, .. } = SharedContainer::List(array).snapshot(txn) else {
            return 0;
        };
        let previous = node.items();
        let mut values = Vec::with_capacity(items.len());
        let mut children = Vec::with_capacity(items.len());
        for snapshot in &items {
            let reused = snapshot
                .container_id()
                .and_then(|container| self.by_container(&container))
                .and_then(|child| self.get(child))
                .filter(|child| child.parent() == Some(id))
                .map(|child| (Value::from(child.node()), child.id()));
            let (value, child) = match reused {
                Some((value, child)) => (value, Some(child)),
                None => self.materialize(snapshot, id, SlotOrigin::Item, cx),
            };
            values.push(value);
            children.push(child);
        }

        let changed = (0..previous.len().max(values.len()))
            .filter(|index| previous.get(*index) != values.get(*index))
            .count();
        node.apply_remove_range(0, previous.len());
        node.apply_insert(0, values);
        self.replace_children(id, children);
        if changed > 0 {
            cx.log
                .debug(format_args!("realigned {changed} items of {id} with the document"));
        }
        changed
    }

    /// Compares a mirror value with a captured document value.
    ///
    /// Containers are equivalent only if the mirror node is bound to that
    /// very container instance; leaves compare by value.
    fn is_equivalent(&self, current: &Value, snapshot: &Snapshot) -> bool {
        match snapshot {
            Snapshot::Leaf(any) => {
                let bound = match current {
                    Value::Map(node) => self.by_node(node.id()).is_some(),
                    Value::List(node) => self.by_node(node.id()).is_some(),
                    _ => false,
                };
                !bound && current.to_any() == normalize(any)
            }
            Snapshot::Map { .. } | Snapshot::List { .. } => {
                let node_id = match current {
                    Value::Map(node) => node.id(),
                    Value::List(node) => node.id(),
                    _ => return false,
                };
                let bound_to = self
                    .by_node(node_id)
                    .and_then(|id| self.get(id))
                    .map(|controller| controller.container_id());
                bound_to.is_some() && bound_to == snapshot.container_id()
            }
            Snapshot::Unsupported => current.is_null(),
        }
    }

    /// Builds a fresh mirror value for `snapshot` under `parent`, binding
    /// controllers for every container inside it.
    pub(crate) fn materialize(
        &mut self,
        snapshot: &Snapshot,
        parent: ControllerId,
        origin: SlotOrigin,
        cx: &mut RemoteContext<'_>,
    ) -> (Value, Option<ControllerId>) {
        match snapshot {
            Snapshot::Leaf(any) => (Value::from(normalize(any)), None),
            Snapshot::Map { container, entries } => {
                let node = MapNode::new();
                let id = self.bind(Binding::Map(container.clone(), node.clone()), parent, origin);
                cx.fresh.insert(id);
                for (key, entry) in entries {
                    if !cx.matcher.should_sync(&*self, id, key, cx.log) {
                        continue;
                    }
                    let (value, child) =
                        self.materialize(entry, id, SlotOrigin::Key(key.clone()), cx);
                    node.apply_set(key.clone(), value);
                    self.set_keyed_child(id, key.clone(), child);
                }
                (Value::Map(node), Some(id))
            }
            Snapshot::List { container, items } => {
                let node = ListNode::new();
                let id = self.bind(Binding::List(container.clone(), node.clone()), parent, origin);
                cx.fresh.insert(id);
                let (values, children): (Vec<Value>, Vec<Option<ControllerId>>) = items
                    .iter()
                    .map(|item| self.materialize(item, id, SlotOrigin::Item, cx))
                    .unzip();
                node.apply_insert(0, values);
                self.splice_children(id, 0, 0, children);
                (Value::List(node), Some(id))
            }
            Snapshot::Unsupported => {
                cx.log.warn(format_args!(
                    "unsupported container kind below {parent}, mirrored as null"
                ));
                (Value::Null, None)
            }
        }
    }
}

/// The mirror never holds `Undefined`.
fn normalize(any: &Any) -> Any {
    match any {
        Any::Undefined => Any::Null,
        other => other.clone(),
    }
}
