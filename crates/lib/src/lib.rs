//!
//! ymirror: keeps a plain, locally mutable tree in sync with a Y-CRDT document.
//!
//! Application code reads and writes an observable *mirror* using ordinary
//! map and list operations. Local writes become batched document
//! transactions, and document changes from any peer become minimal mirror
//! patches that keep the identity of untouched nodes.
//!
//! ## Core Concepts
//!
//! * **Mirror (`mirror::MapNode`, `mirror::ListNode`)**: Reference-counted observable nodes. Mutations on nodes reachable from a session root are journaled.
//! * **Shared containers (`document::SharedContainer`)**: The `yrs` maps and arrays the mirror is bound to.
//! * **Controllers (`controller::ControllerTree`)**: One controller per live container, pairing it with its mirror node and tracking where it sits in its parent.
//! * **Batching (`batcher::TransactionBatcher`)**: All local writes of one tick are committed as a single transaction tagged with the session's origin.
//! * **Reconciliation (`reconciler::RemoteReconciler`)**: Committed transactions are queued by a deep observer and applied to the mirror in commit order.
//! * **Ignore patterns (`path::IgnoreMatcher`)**: Dotted patterns with `*` wildcards exclude keys from syncing in both directions.
//! * **Sessions (`session::SyncSession`)**: Wire all of the above together; `flush()` is the tick boundary.

pub mod batcher;
pub mod constants;
pub mod controller;
pub mod document;
pub mod logger;
pub mod mirror;
pub mod path;
pub mod reconciler;
pub mod session;

pub use document::SharedContainer;
pub use mirror::{ListNode, MapNode, MirrorNode, Value};
pub use session::{
    FlushReport, SessionStats, SyncOptions, SyncSession, create_sync_session,
};

/// Y-CRDT types re-exported so that client code does not need `yrs` as a
/// separate dependency.
pub mod y_crdt {
    pub use yrs::*;
}

/// Result type used throughout the ymirror library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the ymirror library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured errors from mirror mutations
    #[error(transparent)]
    Mirror(mirror::MirrorError),

    /// Structured errors from sessions, batching and bootstrap
    #[error(transparent)]
    Sync(session::SyncError),

    /// Structured errors from ignore-pattern parsing
    #[error(transparent)]
    Pattern(path::PatternError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Mirror(_) => "mirror",
            Error::Sync(_) => "session",
            Error::Pattern(_) => "path",
        }
    }

    /// Check if this error was caused by an `Undefined` value.
    pub fn is_undefined_value(&self) -> bool {
        match self {
            Error::Mirror(mirror_err) => mirror_err.is_undefined_value(),
            _ => false,
        }
    }

    /// Check if this error was caused by an invalid node placement.
    pub fn is_placement_error(&self) -> bool {
        match self {
            Error::Mirror(mirror_err) => mirror_err.is_placement_error(),
            _ => false,
        }
    }

    /// Check if this error is an index range violation, in the mirror or
    /// in the document.
    pub fn is_out_of_bounds(&self) -> bool {
        match self {
            Error::Mirror(mirror_err) => mirror_err.is_out_of_bounds(),
            Error::Sync(sync_err) => sync_err.is_out_of_bounds(),
            _ => false,
        }
    }

    /// Check if the shared document refused a transaction.
    pub fn is_transaction_error(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_transaction_error(),
            _ => false,
        }
    }

    /// Check if this error was raised by bootstrap validation.
    pub fn is_bootstrap_error(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_bootstrap_error(),
            _ => false,
        }
    }

    /// Check if the session was already disposed.
    pub fn is_disposed(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_disposed(),
            _ => false,
        }
    }

    /// Check if this error is configuration-related.
    pub fn is_pattern_error(&self) -> bool {
        matches!(self, Error::Pattern(_))
    }
}
