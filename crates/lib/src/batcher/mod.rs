//! Transaction batcher.
//!
//! Mirror mutations only append records to the session journal. At each
//! flush the batcher drains the journal and writes every record to the
//! shared document inside one transaction tagged with the session's local
//! origin, so a burst of local writes produces exactly one change
//! notification.
//!
//! Remote commits that are still queued when the batch is written have
//! already moved the document away from what the mirror last saw. Records
//! aimed at containers a peer has replaced are dropped, and list records
//! are rebased over the queued list deltas. The lists involved are handed
//! back for realignment once the queue is reconciled.

mod rebase;

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use yrs::{Array, Doc, Origin, ReadTxn, Transact};

use self::rebase::ListRebase;
use crate::{
    Result,
    controller::{ControllerId, ControllerTree, LocalContext},
    document::{ContainerId, SharedContainer},
    logger::Logger,
    mirror::{Journal, LocalOp, MutationRecord, NodeId},
    path::IgnoreMatcher,
    reconciler::QueuedChanges,
    session::SyncError,
};

/// Result of committing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records drained from the journal.
    pub drained: usize,
    /// Records written to the document.
    pub applied: usize,
    /// True if a document transaction was committed.
    pub committed: bool,
    /// Lists whose local and remote changes met in this batch.
    pub realign: HashSet<ContainerId>,
}

#[derive(Debug)]
pub struct TransactionBatcher {
    journal: Rc<Journal>,
    origin: Origin,
}

impl TransactionBatcher {
    pub fn new(journal: Rc<Journal>, origin: Origin) -> Self {
        Self { journal, origin }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn has_pending(&self) -> bool {
        !self.journal.is_empty()
    }

    /// Commits all pending records as one transaction.
    ///
    /// An undefined value fails the whole batch before anything is written.
    /// A record that cannot be placed is skipped and its list is marked for
    /// realignment; the rest of the batch is still written.
    pub(crate) fn flush(
        &self,
        doc: &Doc,
        tree: &mut ControllerTree,
        queued: &QueuedChanges,
        matcher: &IgnoreMatcher,
        log: &Logger,
    ) -> Result<BatchOutcome> {
        let records = self.journal.drain();
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let drained = records.len();

        if let Err(err) = ensure_storable(&records) {
            log.error(format_args!("discarding batch of {drained} local operations: {err}"));
            return Err(err);
        }

        let mut realign = HashSet::new();
        let records = {
            let txn = doc.try_transact().map_err(SyncError::transaction)?;
            let records = if queued.is_empty() {
                records
            } else {
                rebase_records(records, &txn, tree, queued, &mut realign, log)
            };
            fit_bounds(records, &txn, tree, &mut realign, log)
        };

        let mut txn = doc
            .try_transact_mut_with(self.origin.clone())
            .map_err(SyncError::transaction)?;
        let mut bound = HashSet::new();
        let mut cx = LocalContext {
            matcher,
            log,
            bound: &mut bound,
        };
        let mut applied = 0;
        for record in records {
            let target = record.target;
            match tree.apply_local(&mut txn, record, &mut cx) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(err) => {
                    log.warn(format_args!("skipping local operation on {target}: {err}"));
                    if let Some(container) = tree.container_of(target) {
                        realign.insert(container.id());
                    }
                }
            }
        }
        drop(txn);

        log.debug(format_args!(
            "committed {applied} of {drained} local operations"
        ));
        Ok(BatchOutcome {
            drained,
            applied,
            committed: true,
            realign,
        })
    }
}

/// Rejects undefined values anywhere in the batch.
fn ensure_storable(records: &[MutationRecord]) -> Result<()> {
    for record in records {
        match &record.op {
            LocalOp::MapSet { key, value } => value.ensure_storable(key)?,
            LocalOp::ListInsert { index, values } => {
                for (offset, value) in values.iter().enumerate() {
                    value.ensure_storable(&(index + offset).to_string())?;
                }
            }
            LocalOp::ListReplace { index, value } => value.ensure_storable(&index.to_string())?,
            LocalOp::MapDelete { .. } | LocalOp::ListDelete { .. } => {}
        }
    }
    Ok(())
}

/// Moves the batch into the frame of the document as it is now.
///
/// Records on containers that are no longer reachable from the root are
/// dropped. Records on lists with queued remote deltas are rebased, and
/// the child slots of those lists are moved over the same deltas.
fn rebase_records<T: ReadTxn>(
    records: Vec<MutationRecord>,
    txn: &T,
    tree: &mut ControllerTree,
    queued: &QueuedChanges,
    realign: &mut HashSet<ContainerId>,
    log: &Logger,
) -> Vec<MutationRecord> {
    let mut live: HashMap<ControllerId, bool> = HashMap::new();
    let mut lists: HashMap<NodeId, ListRebase> = HashMap::new();
    let mut replayed: Vec<ControllerId> = Vec::new();
    let mut rebased = Vec::with_capacity(records.len());

    for record in records {
        let Some(id) = tree.by_node(record.target) else {
            rebased.push(record);
            continue;
        };
        if !tree.is_live(txn, id, &mut live) {
            log.debug(format_args!(
                "dropping {:?} on {}: its container was replaced remotely",
                record.op.kind(),
                record.target
            ));
            continue;
        }
        let Some(controller) = tree.get(id) else {
            continue;
        };
        let container_id = controller.container_id();
        let (SharedContainer::List(array), Some(deltas)) =
            (controller.container(), queued.ordered(&container_id))
        else {
            rebased.push(record);
            continue;
        };
        let rebase = lists.entry(record.target).or_insert_with(|| {
            realign.insert(container_id);
            replayed.push(id);
            ListRebase::new(array.len(txn) as usize, deltas)
        });
        let target = record.target;
        rebased.extend(
            rebase
                .rebase(record.op)
                .into_iter()
                .map(|op| MutationRecord { target, op }),
        );
    }

    for id in replayed {
        let Some(deltas) = tree
            .get(id)
            .and_then(|controller| queued.ordered(&controller.container_id()))
        else {
            continue;
        };
        tree.replay_child_slots(id, deltas);
    }
    log.debug(format_args!(
        "rebased local records over {} queued notifications",
        queued.notifications()
    ));
    rebased
}

/// Drops list records that would not fit the document lists as they will
/// be when the record is reached, marking their lists for realignment.
fn fit_bounds<T: ReadTxn>(
    records: Vec<MutationRecord>,
    txn: &T,
    tree: &ControllerTree,
    realign: &mut HashSet<ContainerId>,
    log: &Logger,
) -> Vec<MutationRecord> {
    let mut lengths: HashMap<NodeId, usize> = HashMap::new();
    records
        .into_iter()
        .filter(|record| {
            let Some(SharedContainer::List(array)) = tree.container_of(record.target) else {
                return true;
            };
            let len = lengths
                .entry(record.target)
                .or_insert_with(|| array.len(txn) as usize);
            let (operation, index, fits) = match &record.op {
                LocalOp::ListInsert { index, values } => {
                    let fits = *index <= *len;
                    if fits {
                        *len += values.len();
                    }
                    ("insert", *index, fits)
                }
                LocalOp::ListDelete { index, count } => {
                    let fits = index + count <= *len;
                    if fits {
                        *len -= count;
                    }
                    ("delete", index + count, fits)
                }
                LocalOp::ListReplace { index, .. } => ("replace", *index, *index < *len),
                LocalOp::MapSet { .. } | LocalOp::MapDelete { .. } => return true,
            };
            if !fits {
                let err = SyncError::DocumentOutOfBounds {
                    operation,
                    index,
                    len: *len,
                };
                log.warn(format_args!("skipping local operation on {}: {err}", record.target));
                realign.insert(SharedContainer::List(array).id());
            }
            fits
        })
        .collect()
}
