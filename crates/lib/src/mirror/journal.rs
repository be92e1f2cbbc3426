//! Mutation journal for the observable mirror.
//!
//! Every mutating call on an attached mirror node appends a
//! [`MutationRecord`] here. The journal is the mirror's subscription
//! surface: the transaction batcher drains it once per scheduling tick and
//! turns the records into a single document transaction.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::Arc,
};

use super::{NodeId, Value};

/// Kind of a recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Key assignment or index replacement
    Set,
    /// Key removal
    Delete,
    /// Range insertion into a list
    Insert,
    /// Range removal from a list
    SpliceDelete,
}

/// A single local operation against one mirror node.
#[derive(Debug, Clone)]
pub enum LocalOp {
    MapSet { key: Arc<str>, value: Value },
    MapDelete { key: Arc<str> },
    ListInsert { index: usize, values: Vec<Value> },
    ListDelete { index: usize, count: usize },
    ListReplace { index: usize, value: Value },
}

impl LocalOp {
    pub fn kind(&self) -> MutationKind {
        match self {
            LocalOp::MapSet { .. } | LocalOp::ListReplace { .. } => MutationKind::Set,
            LocalOp::MapDelete { .. } => MutationKind::Delete,
            LocalOp::ListInsert { .. } => MutationKind::Insert,
            LocalOp::ListDelete { .. } => MutationKind::SpliceDelete,
        }
    }
}

/// A local operation together with the node it was performed on.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub target: NodeId,
    pub op: LocalOp,
}

/// Ordered buffer of mutation records.
///
/// A journal starts active. Once deactivated it drops everything it holds
/// and ignores further records.
#[derive(Debug)]
pub struct Journal {
    records: RefCell<Vec<MutationRecord>>,
    active: Cell<bool>,
}

impl Journal {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            records: RefCell::new(Vec::new()),
            active: Cell::new(true),
        })
    }

    pub(crate) fn record(&self, target: NodeId, op: LocalOp) {
        if self.active.get() {
            self.records.borrow_mut().push(MutationRecord { target, op });
        }
    }

    /// Takes every buffered record, oldest first.
    pub fn drain(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Stops recording and discards pending records.
    pub fn deactivate(&self) {
        self.active.set(false);
        self.records.borrow_mut().clear();
    }
}
