//! Observable mirror state.
//!
//! The mirror is the plain, locally mutable side of a sync session: a tree
//! of [`MapNode`]s and [`ListNode`]s holding [`Value`]s. Application code
//! mutates it through ordinary methods (`set`, `remove`, `push`, `splice`,
//! ...). Every mutation on a node reachable from the mirror root is
//! appended to the session [`Journal`], which the transaction batcher turns
//! into document operations at the next flush.
//!
//! Remote changes are applied through crate-internal methods that mutate
//! nodes without recording, so they are never echoed back.
//!
//! # Example
//!
//! ```
//! # use ymirror::mirror::{ListNode, MapNode, Value};
//! let profile: MapNode = [("name", "Alice")].into_iter().collect();
//! let users = ListNode::new();
//! users.push(profile.clone())?;
//!
//! assert!(users.get(0).unwrap().as_map().unwrap().ptr_eq(&profile));
//! assert_eq!(users.to_json(), serde_json::json!([{ "name": "Alice" }]));
//! # Ok::<(), ymirror::Error>(())
//! ```

pub mod errors;
pub mod journal;
pub mod node;
mod value;

pub use errors::MirrorError;
pub use journal::{Journal, LocalOp, MutationKind, MutationRecord};
pub use node::{ListNode, MapNode, NodeId};
pub use value::Value;

use yrs::Any;

/// A mirror node of either kind. The session root is one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorNode {
    Map(MapNode),
    List(ListNode),
}

impl MirrorNode {
    pub fn id(&self) -> NodeId {
        match self {
            MirrorNode::Map(node) => node.id(),
            MirrorNode::List(node) => node.id(),
        }
    }

    pub fn as_map(&self) -> Option<&MapNode> {
        match self {
            MirrorNode::Map(node) => Some(node),
            MirrorNode::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListNode> {
        match self {
            MirrorNode::List(node) => Some(node),
            MirrorNode::Map(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MirrorNode::Map(node) => node.len(),
            MirrorNode::List(node) => node.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_any(&self) -> Any {
        match self {
            MirrorNode::Map(node) => node.to_any(),
            MirrorNode::List(node) => node.to_any(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MirrorNode::Map(node) => node.to_json(),
            MirrorNode::List(node) => node.to_json(),
        }
    }
}

impl From<MirrorNode> for Value {
    fn from(node: MirrorNode) -> Self {
        match node {
            MirrorNode::Map(node) => Value::Map(node),
            MirrorNode::List(node) => Value::List(node),
        }
    }
}
