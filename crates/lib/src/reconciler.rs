//! Remote reconciler.
//!
//! A deep observer on the session root captures every committed
//! transaction, local or remote, into an inbox. Reconciliation drains the
//! inbox in commit order and applies each container delta through the
//! controller that owns the container, parents before children.
//!
//! Deltas of containers that have no controller are skipped, as are deltas
//! of controllers materialized while reconciling the same notification:
//! those were built from a snapshot taken at that commit and are already
//! complete.
//!
//! Lists that the batch had to rebase are not replayed delta by delta.
//! Their queued deltas are skipped and each such list is realigned with
//! the document once the inbox is empty.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use yrs::{DeepObservable, Doc, Origin, Subscription, Transact};

use crate::{
    controller::{ControllerTree, RemoteContext},
    document::{ChangeNotification, ContainerId, DeltaBody, RangeOp, SharedContainer},
    logger::Logger,
    path::IgnoreMatcher,
};

type Inbox = Arc<Mutex<VecDeque<ChangeNotification>>>;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Notifications drained from the inbox.
    pub notifications: usize,
    /// Mirror slots changed.
    pub changes: usize,
}

/// Remote changes waiting in the inbox, as seen by the batcher.
#[derive(Debug, Default)]
pub struct QueuedChanges {
    notifications: usize,
    ordered: HashMap<ContainerId, Vec<Vec<RangeOp>>>,
}

impl QueuedChanges {
    pub fn is_empty(&self) -> bool {
        self.notifications == 0
    }

    pub fn notifications(&self) -> usize {
        self.notifications
    }

    /// Queued deltas of one list, oldest first.
    pub fn ordered(&self, container: &ContainerId) -> Option<&[Vec<RangeOp>]> {
        self.ordered.get(container).map(Vec::as_slice)
    }
}

#[derive(Default)]
pub struct RemoteReconciler {
    inbox: Inbox,
    subscription: Option<Subscription>,
}

impl RemoteReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts observing `root`. Transactions tagged with `local_origin` are
    /// marked local.
    pub fn attach(&mut self, root: &SharedContainer, local_origin: Origin) {
        let inbox = self.inbox.clone();
        let observer = move |txn: &yrs::TransactionMut, events: &yrs::types::Events| {
            let notification = ChangeNotification::capture(txn, events, &local_origin);
            if !notification.is_empty() {
                inbox
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(notification);
            }
        };
        let subscription = match root {
            SharedContainer::Map(map) => map.observe_deep(observer),
            SharedContainer::List(array) => array.observe_deep(observer),
        };
        self.subscription = Some(subscription);
    }

    /// Stops observing and drops every queued notification.
    pub fn detach(&mut self) {
        self.subscription = None;
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn pending(&self) -> usize {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }

    /// Copies the list deltas of every queued remote notification.
    pub fn queued(&self) -> QueuedChanges {
        let inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        let mut queued = QueuedChanges::default();
        for notification in inbox.iter().filter(|notification| !notification.local) {
            queued.notifications += 1;
            for delta in &notification.deltas {
                if let DeltaBody::Ordered(ops) = &delta.body {
                    queued
                        .ordered
                        .entry(delta.target.clone())
                        .or_default()
                        .push(ops.clone());
                }
            }
        }
        queued
    }

    fn next(&self) -> Option<ChangeNotification> {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Applies every queued notification to the mirror, oldest first, then
    /// realigns the lists in `realign`.
    pub(crate) fn reconcile(
        &self,
        doc: &Doc,
        tree: &mut ControllerTree,
        realign: &HashSet<ContainerId>,
        matcher: &IgnoreMatcher,
        log: &Logger,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        while let Some(notification) = self.next() {
            outcome.notifications += 1;
            let mut fresh = HashSet::new();
            let mut cx = RemoteContext {
                matcher,
                log,
                local: notification.local,
                fresh: &mut fresh,
            };
            for delta in &notification.deltas {
                let Some(id) = tree.by_container(&delta.target) else {
                    continue;
                };
                if cx.fresh.contains(&id) {
                    continue;
                }
                if matches!(delta.body, DeltaBody::Ordered(_)) && realign.contains(&delta.target) {
                    continue;
                }
                outcome.changes += tree.apply_remote(id, &delta.body, &mut cx);
            }
            log.debug(format_args!(
                "reconciled {} notification with {} deltas",
                if notification.local { "local" } else { "remote" },
                notification.deltas.len()
            ));
        }

        if realign.is_empty() {
            return outcome;
        }
        let txn = match doc.try_transact() {
            Ok(txn) => txn,
            Err(err) => {
                log.error(format_args!(
                    "cannot realign {} lists with the document: {err}",
                    realign.len()
                ));
                return outcome;
            }
        };
        let mut fresh = HashSet::new();
        let mut cx = RemoteContext {
            matcher,
            log,
            local: false,
            fresh: &mut fresh,
        };
        for container in realign {
            if let Some(id) = tree.by_container(container) {
                outcome.changes += tree.realign_list(&txn, id, &mut cx);
            }
        }
        outcome
    }
}
