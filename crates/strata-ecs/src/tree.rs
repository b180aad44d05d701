//! Parent/child tree over the node table.
//!
//! Child lists live in the entity nodes, in insertion order. An entity is a
//! tree node when it is the store root or attached below it; entities outside
//! the root's subtree are floating. Membership is only recomputed when an
//! attachment or detachment actually changes it.

use smallvec::SmallVec;
use tracing::trace;

use crate::{
    entity::{Entity, EntityId, NodeFlags},
    error::{EcsError, EcsResult},
    events::StructuralChange,
    store::EntityStore,
};

impl EntityStore {
    /// Append `child` to the children of `parent` and return its index.
    ///
    /// A child already attached elsewhere is first removed from its old
    /// parent. Attaching a child to its current parent changes nothing. The
    /// store root cannot become a child.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> EcsResult<usize> {
        let (parent, child) = (self.resolve(parent)?, self.resolve(child)?);
        self.check_not_root(child)?;

        if self.nodes.live(child)?.parent == Some(parent) {
            return self.child_position(parent, child);
        }
        self.check_cycle(parent, child)?;

        let index = self.nodes.live(parent)?.children.len();
        self.detach_from_parent(child);
        self.attach(parent, child, index);
        Ok(index)
    }

    /// Insert `child` into the children of `parent` at `index`.
    ///
    /// The index is checked before anything changes. When `child` is already
    /// a child of `parent`, it is moved and `index` refers to the list without
    /// it.
    pub fn insert_child(&mut self, parent: Entity, child: Entity, index: usize) -> EcsResult<()> {
        let (parent, child) = (self.resolve(parent)?, self.resolve(child)?);
        self.check_not_root(child)?;

        let len = self.nodes.live(parent)?.children.len();
        let same_parent = self.nodes.live(child)?.parent == Some(parent);
        let max = if same_parent { len - 1 } else { len };
        if index > max {
            return Err(EcsError::ChildIndexOutOfRange { index, len: max });
        }
        if !same_parent {
            self.check_cycle(parent, child)?;
        }

        self.detach_from_parent(child);
        self.attach(parent, child, index);
        Ok(())
    }

    /// Remove `child` from the children of `parent`.
    ///
    /// Returns `false` if `child` was not a child of `parent`. The removed
    /// child becomes floating.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> EcsResult<bool> {
        let (parent, child) = (self.resolve(parent)?, self.resolve(child)?);
        if self.nodes.live(child)?.parent != Some(parent) {
            return Ok(false);
        }
        self.detach_from_parent(child);
        self.set_membership(child, false);
        Ok(true)
    }

    /// Children of an entity in insertion order.
    pub fn child_ids(&self, entity: Entity) -> EcsResult<&[EntityId]> {
        Ok(self.node(entity)?.children())
    }

    /// Parent of an entity.
    pub fn parent_of(&self, entity: Entity) -> EcsResult<Option<Entity>> {
        Ok(self
            .node(entity)?
            .parent
            .map(|parent| Entity::new(parent, self.id)))
    }

    /// Make `entity` the root of the store tree.
    ///
    /// The root and its subtree become tree nodes; the subtree of a previous
    /// root becomes floating.
    pub fn set_root(&mut self, entity: Entity) -> EcsResult<()> {
        let id = self.resolve(entity)?;
        if self.nodes.live(id)?.parent.is_some() {
            return Err(EcsError::RootHasParent(id));
        }

        if let Some(old) = self.root.replace(id) {
            if old != id {
                self.set_membership(old, false);
            }
        }
        self.set_membership(id, true);
        Ok(())
    }

    /// Root of the store tree.
    #[must_use]
    pub fn root(&self) -> Option<Entity> {
        self.root.map(|id| Entity::new(id, self.id))
    }

    /// Check if an entity is the root or attached below it.
    #[must_use]
    pub fn is_tree_node(&self, entity: Entity) -> bool {
        self.node(entity)
            .is_ok_and(|node| node.flags.contains(NodeFlags::TREE_NODE))
    }

    /// Detach an entity about to be deleted from its parent and children.
    ///
    /// Children are detached last index first.
    pub(crate) fn unlink_tree(&mut self, id: EntityId) {
        self.detach_from_parent(id);

        while let Some(child) = self.nodes.node_mut(id).children.pop() {
            let index = self.nodes.node_mut(id).children.len();
            self.nodes.node_mut(child).parent = None;
            self.set_membership(child, false);
            trace!(parent = %id, child = %child, index, "detached child");
            self.listeners.emit(StructuralChange::ChildRemoved {
                parent: id,
                child,
                index,
            });
        }
    }

    fn child_position(&self, parent: EntityId, child: EntityId) -> EcsResult<usize> {
        self.nodes
            .live(parent)?
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(EcsError::Detached(child))
    }

    /// Reject attaching `child` below `parent` if `child` is `parent` or one
    /// of its ancestors.
    fn check_not_root(&self, child: EntityId) -> EcsResult<()> {
        if self.root == Some(child) {
            return Err(EcsError::RootHasParent(child));
        }
        Ok(())
    }

    fn check_cycle(&self, parent: EntityId, child: EntityId) -> EcsResult<()> {
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(EcsError::CycleDetected { parent, child });
            }
            cursor = self.nodes.get(id).and_then(|node| node.parent);
        }
        Ok(())
    }

    /// Unlink `child` from its parent, leaving tree membership to the caller.
    fn detach_from_parent(&mut self, child: EntityId) {
        let Some(parent) = self.nodes.node_mut(child).parent.take() else {
            return;
        };
        let children = &mut self.nodes.node_mut(parent).children;
        let Some(index) = children.iter().position(|&c| c == child) else {
            return;
        };
        children.remove(index);

        trace!(parent = %parent, child = %child, index, "removed child");
        self.listeners.emit(StructuralChange::ChildRemoved {
            parent,
            child,
            index,
        });
    }

    fn attach(&mut self, parent: EntityId, child: EntityId, index: usize) {
        self.nodes.node_mut(parent).children.insert(index, child);
        self.nodes.node_mut(child).parent = Some(parent);

        let member = self.nodes.node_mut(parent).flags.contains(NodeFlags::TREE_NODE);
        self.set_membership(child, member);
        trace!(parent = %parent, child = %child, index, "added child");
        self.listeners.emit(StructuralChange::ChildAdded {
            parent,
            child,
            index,
        });
    }

    /// Set or clear `TREE_NODE` on the subtree of `id` if it differs.
    fn set_membership(&mut self, id: EntityId, member: bool) {
        if self.nodes.node_mut(id).flags.contains(NodeFlags::TREE_NODE) == member {
            return;
        }

        let mut stack: SmallVec<[EntityId; 16]> = SmallVec::new();
        stack.push(id);
        while let Some(next) = stack.pop() {
            let node = self.nodes.node_mut(next);
            node.flags.set(NodeFlags::TREE_NODE, member);
            stack.extend(node.children.iter().copied());
        }
    }
}
