//! Entity identifiers and the per-store node table.
//!
//! Every entity id indexes one [`EntityNode`] in a flat array. A node whose
//! archetype is `None` is detached: the entity was deleted or never created.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::{
    archetype::ArchetypeId,
    error::{EcsError, EcsResult},
};

/// Dense per-store entity index. Id 0 is the null entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(u32);

impl EntityId {
    /// The null entity.
    pub const NULL: Self = Self(0);

    /// Create an id from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Index into the node table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is the null entity.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identity of an entity store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u32);

impl StoreId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

/// Handle to an entity of a specific store.
///
/// Handles carry their store's identity so that passing an entity to the
/// wrong store fails with [`EcsError::ForeignEntity`] instead of silently
/// touching an unrelated entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    id: EntityId,
    store: StoreId,
}

impl Entity {
    pub(crate) const fn new(id: EntityId, store: StoreId) -> Self {
        Self { id, store }
    }

    /// Get the entity's id.
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }

    /// Get the store this entity belongs to.
    #[must_use]
    pub const fn store(self) -> StoreId {
        self.store
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}@{})", self.id.0, self.store.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id.0, self.store.0)
    }
}

/// Permanent entity id used for serialization, 63 significant bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pid(u64);

impl Pid {
    /// Mask of the significant bits.
    pub const MASK: u64 = (1 << 63) - 1;

    /// Create a pid, dropping the top bit.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw & Self::MASK)
    }

    /// Get the raw pid value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

bitflags! {
    /// Per-entity state bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// The entity was created and not deleted since.
        const CREATED = 1 << 0;
        /// The entity is the store root or attached below it.
        const TREE_NODE = 1 << 1;
    }
}

/// Location of an entity within the archetype storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// The archetype containing this entity.
    pub archetype: ArchetypeId,
    /// Row index within the archetype.
    pub row: usize,
}

/// Per-entity bookkeeping record.
#[derive(Clone, Debug, Default)]
pub struct EntityNode {
    pub(crate) archetype: Option<ArchetypeId>,
    pub(crate) row: usize,
    pub(crate) pid: Pid,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: SmallVec<[EntityId; 4]>,
    pub(crate) flags: NodeFlags,
}

impl EntityNode {
    /// Check if the node belongs to a live entity.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.archetype.is_some()
    }

    /// Current archetype and row, `None` when detached.
    #[must_use]
    pub fn location(&self) -> Option<EntityLocation> {
        self.archetype.map(|archetype| EntityLocation {
            archetype,
            row: self.row,
        })
    }

    /// Permanent id.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Parent in the tree.
    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Children in insertion order.
    #[must_use]
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// State bits.
    #[must_use]
    pub const fn flags(&self) -> NodeFlags {
        self.flags
    }
}

/// Largest id [`EntityStore::create_entity_with_id`](crate::EntityStore::create_entity_with_id)
/// accepts. The node table grows to the claimed id, so it is bounded.
pub const MAX_CLAIMED_ID: u32 = 1 << 20;

/// Node table plus id allocation.
///
/// Fresh ids come from a sequence that skips slots taken by caller-chosen
/// ids. With recycling enabled, freed ids are reused last-in first-out
/// before the sequence advances.
#[derive(Debug)]
pub(crate) struct EntityTable {
    /// Node per id; index 0 is the null entity and never alive.
    nodes: Vec<EntityNode>,
    next_id: u32,
    free_list: Vec<EntityId>,
    recycle_ids: bool,
    alive_count: usize,
}

impl EntityTable {
    pub(crate) fn new(capacity: usize, recycle_ids: bool) -> Self {
        let mut nodes = Vec::with_capacity(capacity + 1);
        nodes.push(EntityNode::default());
        Self {
            nodes,
            next_id: 1,
            free_list: Vec::new(),
            recycle_ids,
            alive_count: 0,
        }
    }

    /// Pick the next free id and grow the table to hold it.
    pub(crate) fn allocate(&mut self) -> EntityId {
        while let Some(id) = self.free_list.pop() {
            // A caller may have claimed the recycled id explicitly.
            if !self.is_alive(id) {
                self.ensure_slot(id);
                return id;
            }
        }

        loop {
            let id = EntityId(self.next_id);
            self.next_id += 1;
            if !self.is_alive(id) {
                self.ensure_slot(id);
                return id;
            }
        }
    }

    /// Validate a caller-chosen id and grow the table to hold it.
    pub(crate) fn claim(&mut self, id: u32) -> EcsResult<EntityId> {
        if id == 0 {
            return Err(EcsError::InvalidEntityId(id));
        }
        if id > MAX_CLAIMED_ID {
            return Err(EcsError::EntityIdTooLarge {
                id,
                max: MAX_CLAIMED_ID,
            });
        }
        let id = EntityId(id);
        if self.is_alive(id) {
            return Err(EcsError::EntityIdInUse(id));
        }
        self.ensure_slot(id);
        Ok(id)
    }

    /// Mark `id` as holding a live entity. The node must be attached by the caller.
    pub(crate) fn mark_alive(&mut self) {
        self.alive_count += 1;
    }

    /// Reset the node of `id` and make the id available again.
    pub(crate) fn release(&mut self, id: EntityId) {
        self.nodes[id.index()] = EntityNode::default();
        self.alive_count -= 1;
        if self.recycle_ids {
            self.free_list.push(id);
        }
    }

    fn ensure_slot(&mut self, id: EntityId) {
        if id.index() >= self.nodes.len() {
            self.nodes.resize_with(id.index() + 1, EntityNode::default);
        }
    }

    pub(crate) fn is_alive(&self, id: EntityId) -> bool {
        self.nodes.get(id.index()).is_some_and(EntityNode::is_alive)
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&EntityNode> {
        self.nodes.get(id.index())
    }

    /// Node of a live entity.
    pub(crate) fn live(&self, id: EntityId) -> EcsResult<&EntityNode> {
        self.nodes
            .get(id.index())
            .filter(|node| node.is_alive())
            .ok_or(EcsError::Detached(id))
    }

    /// Node of an id the caller knows to be in range.
    pub(crate) fn node_mut(&mut self, id: EntityId) -> &mut EntityNode {
        &mut self.nodes[id.index()]
    }

    pub(crate) const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Number of node slots, the null slot excluded.
    pub(crate) fn capacity(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Ids of all live entities in id order.
    pub(crate) fn alive_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_alive())
            .map(|(index, _)| EntityId(index as u32))
    }
}
