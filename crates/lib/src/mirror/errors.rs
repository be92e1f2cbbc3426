//! Error types for mirror mutations.
//!
//! Mirror errors are raised synchronously at the call site of a mutation,
//! before the mirror is changed and before anything is recorded for the
//! next flush.

use thiserror::Error;

/// Structured error types for mirror operations.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MirrorError {
    /// The value (or something nested inside it) is `Undefined`.
    ///
    /// The shared document has no representation for `undefined`; callers
    /// must store `Null` instead.
    #[error("undefined is not allowed at '{path}', use null instead")]
    UndefinedNotAllowed { path: String },

    /// A node was inserted while it is still attached somewhere else.
    #[error("Mirror node {node} is already attached to a parent")]
    AlreadyAttached { node: u64 },

    /// A node was inserted into itself or into one of its descendants.
    #[error("Inserting mirror node {node} would create a cycle")]
    CycleDetected { node: u64 },

    /// List index outside of the valid range.
    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl MirrorError {
    /// Check if this error was caused by an `Undefined` value
    pub fn is_undefined_value(&self) -> bool {
        matches!(self, MirrorError::UndefinedNotAllowed { .. })
    }

    /// Check if this error was caused by an invalid node placement
    pub fn is_placement_error(&self) -> bool {
        matches!(
            self,
            MirrorError::AlreadyAttached { .. } | MirrorError::CycleDetected { .. }
        )
    }

    /// Check if this error is an index range violation
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, MirrorError::IndexOutOfBounds { .. })
    }

    /// Get the offending path for undefined value errors
    pub fn path(&self) -> Option<&str> {
        match self {
            MirrorError::UndefinedNotAllowed { path } => Some(path),
            _ => None,
        }
    }
}

impl From<MirrorError> for crate::Error {
    fn from(err: MirrorError) -> Self {
        crate::Error::Mirror(err)
    }
}
