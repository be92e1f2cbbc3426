//! Error types for session lifecycle, batching and bootstrap.

use thiserror::Error;

use crate::document::ContainerKind;

#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The shared document refused to open a transaction.
    #[error("Could not acquire a document transaction: {reason}")]
    TransactionUnavailable { reason: String },

    /// Bootstrap was called on a root that already holds data.
    #[error("Cannot bootstrap a non-empty root")]
    BootstrapNotEmpty,

    /// The root container and the mirror value have different shapes.
    #[error("Root is a {expected} container but the value is a {actual}")]
    RootKindMismatch {
        expected: ContainerKind,
        actual: &'static str,
    },

    /// A batched list operation does not fit the document's current length.
    #[error("Cannot {operation} at index {index} of a document list of length {len}")]
    DocumentOutOfBounds {
        operation: &'static str,
        index: usize,
        len: usize,
    },

    /// The session was disposed.
    #[error("Sync session has been disposed")]
    SessionDisposed,
}

impl SyncError {
    pub(crate) fn transaction(err: impl std::fmt::Display) -> Self {
        SyncError::TransactionUnavailable {
            reason: err.to_string(),
        }
    }

    /// Check if this error came from the shared document refusing a transaction
    pub fn is_transaction_error(&self) -> bool {
        matches!(self, SyncError::TransactionUnavailable { .. })
    }

    /// Check if this error was raised by bootstrap validation
    pub fn is_bootstrap_error(&self) -> bool {
        matches!(
            self,
            SyncError::BootstrapNotEmpty | SyncError::RootKindMismatch { .. }
        )
    }

    /// Check if this error is a list range violation against the document
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, SyncError::DocumentOutOfBounds { .. })
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, SyncError::SessionDisposed)
    }
}

impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
