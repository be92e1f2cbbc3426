//! Error types for ignore-pattern parsing.

use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string is empty.
    #[error("Ignore pattern '{pattern}' is empty")]
    Empty { pattern: String },
}

impl PatternError {
    /// Get the pattern text that failed to parse
    pub fn pattern(&self) -> &str {
        match self {
            PatternError::Empty { pattern } => pattern,
        }
    }
}

impl From<PatternError> for crate::Error {
    fn from(err: PatternError) -> Self {
        crate::Error::Pattern(err)
    }
}
