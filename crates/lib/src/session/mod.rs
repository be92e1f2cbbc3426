//! Sync sessions.
//!
//! A [`SyncSession`] links one shared-document root container with one
//! mirror tree. Creating a session binds the root, subscribes to document
//! changes and hydrates the mirror from the root's current content.
//!
//! Nothing is synchronized while application code runs: local mutations
//! are journaled and remote commits are queued. [`SyncSession::flush`]
//! marks the scheduling tick boundary. It commits the local batch as one
//! transaction, then reconciles every queued notification in commit order.
//!
//! ```
//! use ymirror::{SyncOptions, SyncSession, y_crdt::{Doc, Map, Transact}};
//!
//! let doc = Doc::new();
//! let mut session = SyncSession::new(
//!     &doc,
//!     |doc| doc.get_or_insert_map("state").into(),
//!     SyncOptions::default(),
//! )?;
//!
//! let state = session.mirror().as_map().unwrap().clone();
//! state.set("title", "draft")?;
//! session.flush()?;
//!
//! let map = doc.get_or_insert_map("state");
//! let txn = doc.transact();
//! assert_eq!(map.get(&txn, "title").unwrap().to_string(&txn), "draft");
//! # Ok::<(), ymirror::Error>(())
//! ```

pub mod errors;
mod options;

pub use errors::SyncError;
pub use options::SyncOptions;

use std::{collections::HashSet, rc::Rc};

use uuid::Uuid;
use yrs::{Doc, Origin, Transact};

use crate::{
    Result,
    batcher::TransactionBatcher,
    constants::LOCAL_ORIGIN_PREFIX,
    controller::{ControllerTree, LocalContext, RemoteContext},
    document::{ContainerKind, DeltaBody, SharedContainer},
    logger::Logger,
    mirror::{Journal, ListNode, MapNode, MirrorNode, Value},
    path::IgnoreMatcher,
    reconciler::{QueuedChanges, RemoteReconciler},
};

/// What one [`SyncSession::flush`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Local operations written to the document.
    pub local_operations: usize,
    /// True if a local transaction was committed.
    pub committed: bool,
    /// Change notifications reconciled into the mirror.
    pub notifications: usize,
    /// Mirror slots changed by reconciliation.
    pub mirror_changes: usize,
}

/// Running totals over the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub flushes: u64,
    pub local_transactions: u64,
    pub local_operations: u64,
    pub notifications: u64,
    pub mirror_changes: u64,
}

pub struct SyncSession {
    id: Uuid,
    doc: Doc,
    root: SharedContainer,
    mirror: MirrorNode,
    journal: Rc<Journal>,
    tree: ControllerTree,
    batcher: TransactionBatcher,
    reconciler: RemoteReconciler,
    matcher: IgnoreMatcher,
    log: Logger,
    stats: SessionStats,
    disposed: bool,
}

/// Creates a session. Same as [`SyncSession::new`].
pub fn create_sync_session<F>(doc: &Doc, get_root: F, options: SyncOptions) -> Result<SyncSession>
where
    F: FnOnce(&Doc) -> SharedContainer,
{
    SyncSession::new(doc, get_root, options)
}

impl SyncSession {
    /// Binds the container selected by `get_root` to a new mirror tree.
    ///
    /// The mirror is hydrated from the container's current content, so a
    /// session over a populated document starts in sync.
    pub fn new<F>(doc: &Doc, get_root: F, options: SyncOptions) -> Result<Self>
    where
        F: FnOnce(&Doc) -> SharedContainer,
    {
        let id = Uuid::new_v4();
        let log = Logger::new(id, options.debug);
        let matcher = IgnoreMatcher::new(&options.sync_ignore)?;
        let root = get_root(doc);

        let journal = Journal::new();
        let mirror = match root.kind() {
            ContainerKind::Keyed => MirrorNode::Map(MapNode::new_root(&journal)),
            ContainerKind::Ordered => MirrorNode::List(ListNode::new_root(&journal)),
        };
        let mut tree = ControllerTree::new();
        tree.bind_root(root.clone(), mirror.clone())?;

        let origin = Origin::from(format!("{LOCAL_ORIGIN_PREFIX}{id}").as_str());
        let mut reconciler = RemoteReconciler::new();
        reconciler.attach(&root, origin.clone());

        let mut session = Self {
            id,
            doc: doc.clone(),
            root,
            mirror,
            batcher: TransactionBatcher::new(journal.clone(), origin),
            journal,
            tree,
            reconciler,
            matcher,
            log,
            stats: SessionStats::default(),
            disposed: false,
        };
        session.hydrate()?;
        session.log.debug(format_args!(
            "session started on {} root with {} ignore patterns",
            session.root.kind(),
            session.matcher.patterns().len()
        ));
        Ok(session)
    }

    fn hydrate(&mut self) -> Result<()> {
        let snapshot = {
            let txn = self.doc.try_transact().map_err(SyncError::transaction)?;
            self.root.snapshot(&txn)
        };
        let (Some(root), Some(body)) = (self.tree.root(), DeltaBody::from_snapshot(snapshot))
        else {
            return Ok(());
        };
        let mut fresh = HashSet::new();
        let mut cx = RemoteContext {
            matcher: &self.matcher,
            log: &self.log,
            local: false,
            fresh: &mut fresh,
        };
        self.tree.apply_remote(root, &body, &mut cx);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The mirror root. Mutate it through [`MapNode`] or [`ListNode`]
    /// methods; changes are written at the next flush.
    pub fn mirror(&self) -> &MirrorNode {
        &self.mirror
    }

    pub fn root(&self) -> &SharedContainer {
        &self.root
    }

    /// Seeds an empty root with `value` in a single transaction.
    ///
    /// `value` must have the root's shape. It is copied into the mirror, so
    /// the nodes passed in stay detached. Anything journaled before the
    /// call is flushed first. Fails with [`SyncError::BootstrapNotEmpty`]
    /// if the document root or the mirror root already holds data.
    pub fn bootstrap(&mut self, value: impl Into<Value>) -> Result<()> {
        self.ensure_active()?;
        let value = value.into();
        value.ensure_storable("")?;
        let expected = self.root.kind();
        let entries_fit = matches!(
            (expected, &value),
            (ContainerKind::Keyed, Value::Map(_)) | (ContainerKind::Ordered, Value::List(_))
        );
        if !entries_fit {
            return Err(SyncError::RootKindMismatch {
                expected,
                actual: value.type_name(),
            }
            .into());
        }

        self.flush()?;
        let document_len = {
            let txn = self.doc.try_transact().map_err(SyncError::transaction)?;
            self.root.len(&txn)
        };
        if document_len > 0 || !self.mirror.is_empty() {
            return Err(SyncError::BootstrapNotEmpty.into());
        }

        match (&self.mirror, value.deep_copy()) {
            (MirrorNode::Map(root), Value::Map(copy)) => {
                for (key, entry) in copy.entries() {
                    copy.apply_remove(&key);
                    root.apply_set(key, entry);
                }
            }
            (MirrorNode::List(root), Value::List(copy)) => {
                let items = copy.apply_remove_range(0, copy.len());
                root.apply_insert(0, items);
            }
            _ => {}
        }

        let mut txn = self
            .doc
            .try_transact_mut_with(self.batcher.origin().clone())
            .map_err(SyncError::transaction)?;
        let mut bound = HashSet::new();
        let mut cx = LocalContext {
            matcher: &self.matcher,
            log: &self.log,
            bound: &mut bound,
        };
        self.tree.write_root(&mut txn, &mut cx)?;
        drop(txn);

        // The echo is reconciled before any newer local mutation exists.
        let reconciled = self.reconciler.reconcile(
            &self.doc,
            &mut self.tree,
            &HashSet::new(),
            &self.matcher,
            &self.log,
        );
        self.stats.notifications += reconciled.notifications as u64;
        self.stats.local_transactions += 1;
        self.log.debug(format_args!(
            "bootstrapped root with {} entries",
            self.mirror.len()
        ));
        Ok(())
    }

    /// Scheduling tick boundary.
    ///
    /// Commits journaled local mutations as one transaction, then applies
    /// every queued change notification to the mirror in commit order.
    /// Local records are rebased over remote changes that are still
    /// queued, and lists touched from both sides end up equal to the
    /// document. A failed commit is returned after the queued
    /// notifications have still been reconciled; its records are dropped.
    pub fn flush(&mut self) -> Result<FlushReport> {
        self.ensure_active()?;
        let queued = if self.batcher.has_pending() {
            self.reconciler.queued()
        } else {
            QueuedChanges::default()
        };
        let committed = self.batcher.flush(
            &self.doc,
            &mut self.tree,
            &queued,
            &self.matcher,
            &self.log,
        );
        let realign = committed
            .as_ref()
            .map(|batch| batch.realign.clone())
            .unwrap_or_default();
        let reconciled = self.reconciler.reconcile(
            &self.doc,
            &mut self.tree,
            &realign,
            &self.matcher,
            &self.log,
        );

        self.stats.flushes += 1;
        self.stats.notifications += reconciled.notifications as u64;
        self.stats.mirror_changes += reconciled.changes as u64;
        let batch = committed?;
        if batch.committed {
            self.stats.local_transactions += 1;
            self.stats.local_operations += batch.applied as u64;
        }
        Ok(FlushReport {
            local_operations: batch.applied,
            committed: batch.committed,
            notifications: reconciled.notifications,
            mirror_changes: reconciled.changes,
        })
    }

    /// True if local mutations or document changes are waiting for a flush.
    pub fn has_pending(&self) -> bool {
        !self.disposed && (self.batcher.has_pending() || self.reconciler.has_pending())
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Number of live controllers, the root included.
    pub fn controller_count(&self) -> usize {
        self.tree.len()
    }

    /// Plain snapshot of the root container's current document content.
    pub fn document_value(&self) -> Result<Value> {
        let txn = self.doc.try_transact().map_err(SyncError::transaction)?;
        Ok(self.root.snapshot(&txn).to_value())
    }

    /// Unlinks the mirror from the document.
    ///
    /// Pending local mutations and queued notifications are dropped. Both
    /// sides keep their last synchronized state. Calling it again is a
    /// no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.journal.deactivate();
        self.reconciler.detach();
        self.tree.dispose_all();
        self.log.debug(format_args!("session disposed"));
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_active(&self) -> Result<()> {
        if self.disposed {
            return Err(SyncError::SessionDisposed.into());
        }
        Ok(())
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("controllers", &self.tree.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
