//! Structural paths and sync-exclusion rules.
//!
//! A structural path names the location of an operation relative to the
//! session root: a literal key for every keyed-container step, and an
//! [`PathSegment::Item`] marker for every ordered-container step. Numeric
//! list positions are never computed.
//!
//! - [`resolver`] reconstructs paths by walking parent links.
//! - [`pattern`] parses ignore patterns and matches them against paths.

pub mod errors;
pub mod pattern;
pub mod resolver;

use std::{fmt, sync::Arc};

pub use errors::PatternError;
pub use pattern::{IgnoreMatcher, IgnorePattern, PatternSegment};
pub use resolver::{ContainerHierarchy, Placement, get_path};

use crate::constants::{PATH_SEPARATOR, WILDCARD};

/// One step of a structural path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Key inside a keyed container
    Key(Arc<str>),
    /// Any position inside an ordered container
    Item,
}

impl PathSegment {
    pub fn key(key: impl Into<Arc<str>>) -> Self {
        PathSegment::Key(key.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(key) => Some(key),
            PathSegment::Item => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Item => f.write_str(WILDCARD),
        }
    }
}

/// Renders a path in dotted form, e.g. `data.*.name`.
pub fn display_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(PathSegment::to_string)
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}
