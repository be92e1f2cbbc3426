//! Path reconstruction over a container hierarchy.
//!
//! The resolver is generic over anything that can report, for a container
//! handle, where that container sits in its parent. The controller arena is
//! the production implementation; tests use small fixtures.

use std::{collections::HashSet, hash::Hash, sync::Arc};

use super::PathSegment;

/// Where a container sits relative to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement<H> {
    /// The container is the configured root.
    Root,
    /// The container is the value of `key` in a keyed parent.
    Keyed { parent: H, key: Arc<str> },
    /// The container is an element of an ordered parent.
    Ordered { parent: H },
}

/// A tree of containers with parent back-references.
pub trait ContainerHierarchy {
    type Handle: Copy + Eq + Hash;

    /// Returns the placement of `handle`, or `None` if it is not live.
    fn placement(&self, handle: Self::Handle) -> Option<Placement<Self::Handle>>;
}

/// Reconstructs the path of `key` inside `container`, starting at the root.
///
/// Returns `None` when the path is unknown: the container is not live, an
/// ancestor is detached, or the parent links form a loop.
pub fn get_path<T: ContainerHierarchy>(
    hierarchy: &T,
    container: T::Handle,
    key: &str,
) -> Option<Vec<PathSegment>> {
    let mut segments = vec![PathSegment::key(key)];
    let mut visited = HashSet::new();
    let mut current = container;

    loop {
        if !visited.insert(current) {
            return None;
        }
        match hierarchy.placement(current)? {
            Placement::Root => break,
            Placement::Keyed { parent, key } => {
                segments.push(PathSegment::Key(key));
                current = parent;
            }
            Placement::Ordered { parent } => {
                segments.push(PathSegment::Item);
                current = parent;
            }
        }
    }

    segments.reverse();
    Some(segments)
}
