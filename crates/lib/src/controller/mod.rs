//! Controllers bind shared containers to mirror nodes.
//!
//! Each live shared container reachable from the session root has exactly
//! one [`Controller`], pairing it with the mirror node that reflects it.
//! Controllers live in an arena ([`ControllerTree`]) indexed by
//! [`ControllerId`], with lookups by container identity and by mirror node
//! id. Each controller records its parent and the slot it occupies there,
//! which is what path resolution walks.
//!
//! The two directions of the binding are implemented in submodules:
//!
//! - `local`: mirror mutation records become document operations.
//! - `remote`: document deltas become silent mirror mutations.
//!
//! Lifecycle: a controller is `Bound` from construction until it is
//! disposed, which happens when its container is deleted or replaced in
//! its parent, when a newer controller claims the same container or node,
//! or when the whole session is disposed. Disposing a controller disposes
//! all of its descendants. A disposed id is never reused.

mod local;
mod remote;

pub(crate) use local::LocalContext;
pub(crate) use remote::RemoteContext;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use yrs::{Array, ArrayRef, Map, MapRef, ReadTxn};

use crate::{
    document::{ContainerId, ContainerKind, SharedContainer, out_container_id},
    mirror::{ListNode, MapNode, MirrorNode, NodeId, Value},
    path::{ContainerHierarchy, Placement},
    session::SyncError,
};

/// Arena index of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(u64);

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Unbound,
    Bound,
    Disposed,
}

/// The slot a controller's container occupies in its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOrigin {
    /// The configured root has no parent.
    Root,
    /// Value of a key in a keyed parent.
    Key(Arc<str>),
    /// Element of an ordered parent.
    Item,
}

#[derive(Clone)]
pub(crate) enum Binding {
    Map(MapRef, MapNode),
    List(ArrayRef, ListNode),
}

impl Binding {
    fn new(container: SharedContainer, node: MirrorNode) -> Result<Self, SyncError> {
        match (container, node) {
            (SharedContainer::Map(map), MirrorNode::Map(node)) => Ok(Binding::Map(map, node)),
            (SharedContainer::List(array), MirrorNode::List(node)) => {
                Ok(Binding::List(array, node))
            }
            (container, node) => Err(SyncError::RootKindMismatch {
                expected: container.kind(),
                actual: Value::from(node).type_name(),
            }),
        }
    }
}

#[derive(Debug)]
enum Children {
    Keyed(HashMap<Arc<str>, ControllerId>),
    /// Aligned with the mirror list; `None` for leaf items.
    Indexed(Vec<Option<ControllerId>>),
}

impl Children {
    fn ids(&self) -> Vec<ControllerId> {
        match self {
            Children::Keyed(map) => map.values().copied().collect(),
            Children::Indexed(items) => items.iter().flatten().copied().collect(),
        }
    }
}

/// Binding between one shared container and one mirror node.
pub struct Controller {
    id: ControllerId,
    binding: Binding,
    parent: Option<ControllerId>,
    origin: SlotOrigin,
    children: Children,
}

impl Controller {
    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn parent(&self) -> Option<ControllerId> {
        self.parent
    }

    pub fn origin(&self) -> &SlotOrigin {
        &self.origin
    }

    pub fn kind(&self) -> ContainerKind {
        match self.binding {
            Binding::Map(..) => ContainerKind::Keyed,
            Binding::List(..) => ContainerKind::Ordered,
        }
    }

    pub fn container(&self) -> SharedContainer {
        match &self.binding {
            Binding::Map(map, _) => SharedContainer::Map(map.clone()),
            Binding::List(array, _) => SharedContainer::List(array.clone()),
        }
    }

    pub fn container_id(&self) -> ContainerId {
        self.container().id()
    }

    pub fn node(&self) -> MirrorNode {
        match &self.binding {
            Binding::Map(_, node) => MirrorNode::Map(node.clone()),
            Binding::List(_, node) => MirrorNode::List(node.clone()),
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("node", &self.node().id())
            .field("parent", &self.parent)
            .field("origin", &self.origin)
            .field("children", &self.children)
            .finish()
    }
}

/// Arena of all controllers of one session.
#[derive(Debug, Default)]
pub struct ControllerTree {
    controllers: HashMap<ControllerId, Controller>,
    by_container: HashMap<ContainerId, ControllerId>,
    by_node: HashMap<NodeId, ControllerId>,
    root: Option<ControllerId>,
    next_id: u64,
}

impl ControllerTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the session root. Fails if the shapes differ.
    pub fn bind_root(
        &mut self,
        container: SharedContainer,
        node: MirrorNode,
    ) -> Result<ControllerId, SyncError> {
        let binding = Binding::new(container, node)?;
        if let Some(old) = self.root.take() {
            self.dispose(old);
        }
        let id = self.insert(binding, None, SlotOrigin::Root);
        self.root = Some(id);
        Ok(id)
    }

    /// Binds `container` to `node` below `parent`.
    ///
    /// Does not recurse and does not register the new controller as a child
    /// of `parent`; callers place it with [`set_keyed_child`] or
    /// [`splice_children`]. Any controller still bound to the same
    /// container or the same node is disposed first.
    ///
    /// [`set_keyed_child`]: Self::set_keyed_child
    /// [`splice_children`]: Self::splice_children
    pub(crate) fn bind(
        &mut self,
        binding: Binding,
        parent: ControllerId,
        origin: SlotOrigin,
    ) -> ControllerId {
        self.insert(binding, Some(parent), origin)
    }

    fn insert(
        &mut self,
        binding: Binding,
        parent: Option<ControllerId>,
        origin: SlotOrigin,
    ) -> ControllerId {
        let (container_id, node_id, children) = match &binding {
            Binding::Map(map, node) => (
                SharedContainer::Map(map.clone()).id(),
                node.id(),
                Children::Keyed(HashMap::new()),
            ),
            Binding::List(array, node) => (
                SharedContainer::List(array.clone()).id(),
                node.id(),
                Children::Indexed(Vec::new()),
            ),
        };
        if let Some(stale) = self.by_container.get(&container_id).copied() {
            self.dispose(stale);
        }
        if let Some(stale) = self.by_node.get(&node_id).copied() {
            self.dispose(stale);
        }

        let id = ControllerId(self.next_id);
        self.next_id += 1;
        self.by_container.insert(container_id, id);
        self.by_node.insert(node_id, id);
        self.controllers.insert(
            id,
            Controller {
                id,
                binding,
                parent,
                origin,
                children,
            },
        );
        id
    }

    pub fn root(&self) -> Option<ControllerId> {
        self.root
    }

    pub fn get(&self, id: ControllerId) -> Option<&Controller> {
        self.controllers.get(&id)
    }

    pub fn state(&self, id: ControllerId) -> ControllerState {
        if self.controllers.contains_key(&id) {
            ControllerState::Bound
        } else if id.0 < self.next_id {
            ControllerState::Disposed
        } else {
            ControllerState::Unbound
        }
    }

    pub fn by_container(&self, container: &ContainerId) -> Option<ControllerId> {
        self.by_container.get(container).copied()
    }

    pub fn by_node(&self, node: NodeId) -> Option<ControllerId> {
        self.by_node.get(&node).copied()
    }

    /// The container `node` is bound to, if any.
    pub fn container_of(&self, node: NodeId) -> Option<SharedContainer> {
        self.by_node(node)
            .and_then(|id| self.get(id))
            .map(Controller::container)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Child controller bound at `key` of a keyed controller.
    pub fn keyed_child(&self, id: ControllerId, key: &str) -> Option<ControllerId> {
        match &self.get(id)?.children {
            Children::Keyed(map) => map.get(key).copied(),
            Children::Indexed(_) => None,
        }
    }

    /// Child controller bound at `index` of an ordered controller.
    pub fn indexed_child(&self, id: ControllerId, index: usize) -> Option<ControllerId> {
        match &self.get(id)?.children {
            Children::Indexed(items) => items.get(index).copied().flatten(),
            Children::Keyed(_) => None,
        }
    }

    pub(crate) fn binding(&self, id: ControllerId) -> Option<Binding> {
        self.get(id).map(|controller| controller.binding.clone())
    }

    /// Places `child` at `key`, disposing whatever controller was there.
    pub(crate) fn set_keyed_child(
        &mut self,
        id: ControllerId,
        key: Arc<str>,
        child: Option<ControllerId>,
    ) {
        let replaced = match self.controllers.get_mut(&id).map(|c| &mut c.children) {
            Some(Children::Keyed(map)) => match child {
                Some(child) => map.insert(key, child),
                None => map.remove(&key),
            },
            _ => None,
        };
        if let Some(old) = replaced.filter(|old| Some(*old) != child) {
            self.dispose_subtree(old);
        }
    }

    /// Mirrors a list splice on the child slots of an ordered controller,
    /// disposing the controllers of removed slots. The range is clamped.
    pub(crate) fn splice_children(
        &mut self,
        id: ControllerId,
        index: usize,
        delete_count: usize,
        inserted: Vec<Option<ControllerId>>,
    ) {
        let removed: Vec<ControllerId> =
            match self.controllers.get_mut(&id).map(|c| &mut c.children) {
                Some(Children::Indexed(items)) => {
                    let start = index.min(items.len());
                    let end = start.saturating_add(delete_count).min(items.len());
                    items.splice(start..end, inserted).flatten().collect()
                }
                _ => Vec::new(),
            };
        for old in removed {
            self.dispose_subtree(old);
        }
    }

    /// Replaces every child slot of an ordered controller, disposing the
    /// previous children that are not kept.
    pub(crate) fn replace_children(
        &mut self,
        id: ControllerId,
        children: Vec<Option<ControllerId>>,
    ) {
        let kept: HashSet<ControllerId> = children.iter().flatten().copied().collect();
        let previous = match self.controllers.get_mut(&id).map(|c| &mut c.children) {
            Some(Children::Indexed(items)) => std::mem::replace(items, children),
            _ => return,
        };
        for old in previous.into_iter().flatten() {
            if !kept.contains(&old) {
                self.dispose_subtree(old);
            }
        }
    }

    /// True if the container bound by `id` is still reachable from the root
    /// in the document as read through `txn`. Answers are memoized in
    /// `memo`, which must not outlive the transaction.
    pub(crate) fn is_live<T: ReadTxn>(
        &self,
        txn: &T,
        id: ControllerId,
        memo: &mut HashMap<ControllerId, bool>,
    ) -> bool {
        if let Some(live) = memo.get(&id) {
            return *live;
        }
        let live = match (self.get(id), self.placement(id)) {
            (Some(_), Some(Placement::Root)) => true,
            (Some(controller), Some(Placement::Keyed { parent, key })) => {
                let container = controller.container_id();
                self.is_live(txn, parent, memo)
                    && match self.binding(parent) {
                        Some(Binding::Map(map, _)) => map
                            .get(txn, &key)
                            .and_then(|out| out_container_id(&out))
                            .is_some_and(|found| found == container),
                        _ => false,
                    }
            }
            (Some(controller), Some(Placement::Ordered { parent })) => {
                let container = controller.container_id();
                self.is_live(txn, parent, memo)
                    && match self.binding(parent) {
                        Some(Binding::List(array, _)) => array
                            .iter(txn)
                            .filter_map(|out| out_container_id(&out))
                            .any(|found| found == container),
                        _ => false,
                    }
            }
            _ => false,
        };
        memo.insert(id, live);
        live
    }

    /// Disposes `id` and its descendants and unlinks it from its parent.
    pub fn dispose(&mut self, id: ControllerId) {
        let parent = self.get(id).and_then(|c| c.parent.map(|p| (p, c.origin.clone())));
        if let Some((parent, origin)) = parent {
            if let Some(children) = self.controllers.get_mut(&parent).map(|c| &mut c.children) {
                match (children, origin) {
                    (Children::Keyed(map), SlotOrigin::Key(key)) => {
                        if map.get(&key) == Some(&id) {
                            map.remove(&key);
                        }
                    }
                    (Children::Indexed(items), _) => {
                        items
                            .iter_mut()
                            .filter(|slot| **slot == Some(id))
                            .for_each(|slot| *slot = None);
                    }
                    _ => {}
                }
            }
        }
        self.dispose_subtree(id);
    }

    fn dispose_subtree(&mut self, id: ControllerId) {
        let Some(controller) = self.controllers.remove(&id) else {
            return;
        };
        if self.root == Some(id) {
            self.root = None;
        }
        let container_id = controller.container_id();
        if self.by_container.get(&container_id) == Some(&id) {
            self.by_container.remove(&container_id);
        }
        let node_id = controller.node().id();
        if self.by_node.get(&node_id) == Some(&id) {
            self.by_node.remove(&node_id);
        }
        for child in controller.children.ids() {
            self.dispose_subtree(child);
        }
    }

    /// Disposes every controller.
    pub fn dispose_all(&mut self) {
        self.controllers.clear();
        self.by_container.clear();
        self.by_node.clear();
        self.root = None;
    }
}

impl ContainerHierarchy for ControllerTree {
    type Handle = ControllerId;

    fn placement(&self, handle: ControllerId) -> Option<Placement<ControllerId>> {
        let controller = self.get(handle)?;
        let placement = match (&controller.origin, controller.parent) {
            (SlotOrigin::Root, _) if self.root == Some(handle) => Placement::Root,
            (SlotOrigin::Root, _) => return None,
            (SlotOrigin::Key(key), Some(parent)) => Placement::Keyed {
                parent,
                key: key.clone(),
            },
            (SlotOrigin::Item, Some(parent)) => Placement::Ordered { parent },
            (_, None) => return None,
        };
        Some(placement)
    }
}
