//! Local write path: mirror mutation records to document operations.

use std::{collections::HashSet, sync::Arc};

use yrs::{Array, ArrayPrelim, ArrayRef, Map, MapPrelim, MapRef, TransactionMut};

use super::{Binding, ControllerId, ControllerTree, SlotOrigin};
use crate::{
    Result,
    logger::Logger,
    mirror::{ListNode, LocalOp, MapNode, MirrorError, MutationRecord, NodeId, Value},
    path::IgnoreMatcher,
    session::SyncError,
};

pub(crate) struct LocalContext<'a> {
    pub matcher: &'a IgnoreMatcher,
    pub log: &'a Logger,
    /// Nodes bound during the current flush. Their full content has been
    /// written already, so later records targeting them are redundant.
    pub bound: &'a mut HashSet<NodeId>,
}

impl ControllerTree {
    /// Applies one mutation record inside `txn`.
    ///
    /// Returns false when the record was skipped: its target is not bound,
    /// was bound during this flush, or the key is ignored.
    pub(crate) fn apply_local(
        &mut self,
        txn: &mut TransactionMut,
        record: MutationRecord,
        cx: &mut LocalContext<'_>,
    ) -> Result<bool> {
        if cx.bound.contains(&record.target) {
            return Ok(false);
        }
        let Some(id) = self.by_node(record.target) else {
            cx.log.debug(format_args!(
                "skipping {:?} on unbound node {}",
                record.op.kind(),
                record.target
            ));
            return Ok(false);
        };
        let Some(binding) = self.binding(id) else {
            return Ok(false);
        };

        match (binding, record.op) {
            (Binding::Map(map, _), LocalOp::MapSet { key, value }) => {
                if !cx.matcher.should_sync(&*self, id, &key, cx.log) {
                    return Ok(false);
                }
                self.write_entry(txn, id, &map, key, &value, cx)?;
            }
            (Binding::Map(map, _), LocalOp::MapDelete { key }) => {
                if !cx.matcher.should_sync(&*self, id, &key, cx.log) {
                    return Ok(false);
                }
                map.remove(txn, &key);
                self.set_keyed_child(id, key, None);
            }
            (Binding::List(array, _), LocalOp::ListInsert { index, values }) => {
                let len = array.len(txn) as usize;
                if index > len {
                    return Err(out_of_bounds("insert", index, len));
                }
                self.write_items(txn, id, &array, index, &values, cx)?;
            }
            (Binding::List(array, _), LocalOp::ListDelete { index, count }) => {
                let len = array.len(txn) as usize;
                if index + count > len {
                    return Err(out_of_bounds("delete", index + count, len));
                }
                array.remove_range(txn, index as u32, count as u32);
                self.splice_children(id, index, count, Vec::new());
            }
            (Binding::List(array, _), LocalOp::ListReplace { index, value }) => {
                let len = array.len(txn) as usize;
                if index >= len {
                    return Err(out_of_bounds("replace", index, len));
                }
                array.remove_range(txn, index as u32, 1);
                self.splice_children(id, index, 1, Vec::new());
                self.write_items(txn, id, &array, index, std::slice::from_ref(&value), cx)?;
            }
            (_, op) => {
                cx.log.warn(format_args!(
                    "{:?} does not apply to the {} container of {id}",
                    op.kind(),
                    self.get(id).map(|c| c.kind().to_string()).unwrap_or_default()
                ));
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Writes `value` at `key` of a keyed container.
    fn write_entry(
        &mut self,
        txn: &mut TransactionMut,
        id: ControllerId,
        map: &MapRef,
        key: Arc<str>,
        value: &Value,
        cx: &mut LocalContext<'_>,
    ) -> Result<()> {
        let child = match value {
            Value::Map(node) => {
                let shared = map.insert(txn, key.clone(), MapPrelim::default());
                Some(self.bind_map(txn, shared, node, id, SlotOrigin::Key(key.clone()), cx)?)
            }
            Value::List(node) => {
                let shared = map.insert(txn, key.clone(), ArrayPrelim::default());
                Some(self.bind_list(txn, shared, node, id, SlotOrigin::Key(key.clone()), cx)?)
            }
            leaf => {
                map.insert(txn, key.clone(), storable(leaf, &key)?);
                None
            }
        };
        self.set_keyed_child(id, key, child);
        Ok(())
    }

    /// Inserts `values` at `index` of an ordered container.
    fn write_items(
        &mut self,
        txn: &mut TransactionMut,
        id: ControllerId,
        array: &ArrayRef,
        index: usize,
        values: &[Value],
        cx: &mut LocalContext<'_>,
    ) -> Result<()> {
        let mut children = Vec::with_capacity(values.len());
        for (offset, value) in values.iter().enumerate() {
            let position = (index + offset) as u32;
            let child = match value {
                Value::Map(node) => {
                    let shared = array.insert(txn, position, MapPrelim::default());
                    Some(self.bind_map(txn, shared, node, id, SlotOrigin::Item, cx)?)
                }
                Value::List(node) => {
                    let shared = array.insert(txn, position, ArrayPrelim::default());
                    Some(self.bind_list(txn, shared, node, id, SlotOrigin::Item, cx)?)
                }
                leaf => {
                    array.insert(txn, position, storable(leaf, &position.to_string())?);
                    None
                }
            };
            children.push(child);
        }
        self.splice_children(id, index, 0, children);
        Ok(())
    }

    /// Binds a freshly created shared map to `node` and writes the node's
    /// current content into it.
    fn bind_map(
        &mut self,
        txn: &mut TransactionMut,
        shared: MapRef,
        node: &MapNode,
        parent: ControllerId,
        origin: SlotOrigin,
        cx: &mut LocalContext<'_>,
    ) -> Result<ControllerId> {
        let id = self.bind(Binding::Map(shared.clone(), node.clone()), parent, origin);
        cx.bound.insert(node.id());
        for (key, value) in node.entries() {
            if cx.matcher.should_sync(&*self, id, &key, cx.log) {
                self.write_entry(txn, id, &shared, key, &value, cx)?;
            }
        }
        Ok(id)
    }

    fn bind_list(
        &mut self,
        txn: &mut TransactionMut,
        shared: ArrayRef,
        node: &ListNode,
        parent: ControllerId,
        origin: SlotOrigin,
        cx: &mut LocalContext<'_>,
    ) -> Result<ControllerId> {
        let id = self.bind(Binding::List(shared.clone(), node.clone()), parent, origin);
        cx.bound.insert(node.id());
        self.write_items(txn, id, &shared, 0, &node.items(), cx)?;
        Ok(id)
    }

    /// Writes the full content of an empty root container from `node`.
    pub(crate) fn write_root(
        &mut self,
        txn: &mut TransactionMut,
        cx: &mut LocalContext<'_>,
    ) -> Result<()> {
        let Some(root) = self.root() else {
            return Ok(());
        };
        match self.binding(root) {
            Some(Binding::Map(map, node)) => {
                cx.bound.insert(node.id());
                for (key, value) in node.entries() {
                    if cx.matcher.should_sync(&*self, root, &key, cx.log) {
                        self.write_entry(txn, root, &map, key, &value, cx)?;
                    }
                }
            }
            Some(Binding::List(array, node)) => {
                cx.bound.insert(node.id());
                self.write_items(txn, root, &array, 0, &node.items(), cx)?;
            }
            None => {}
        }
        Ok(())
    }
}

fn storable(leaf: &Value, path: &str) -> std::result::Result<yrs::Any, MirrorError> {
    leaf.ensure_storable(path)?;
    Ok(leaf.leaf_any().unwrap_or(yrs::Any::Null))
}

fn out_of_bounds(operation: &'static str, index: usize, len: usize) -> crate::Error {
    SyncError::DocumentOutOfBounds {
        operation,
        index,
        len,
    }
    .into()
}
