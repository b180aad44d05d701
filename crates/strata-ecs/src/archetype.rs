//! Archetype storage - tables of entities with identical signatures.
//!
//! An archetype represents a unique combination of component types and tags.
//! All entities with the same signature are stored together, one column per
//! component type, all columns in row lockstep with the entity list.

use std::fmt;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    bitset::{ComponentTypes, Tags},
    chunk::{Chunk, ChunkEntities, ChunkMut},
    column::{ErasedColumn, TypedColumn},
    component::{Component, ComponentIndex, TypeRegistry},
    entity::EntityId,
};

/// Unique identifier for an archetype.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The empty archetype (no components, no tags).
    pub const EMPTY: Self = Self(0);

    /// Create an archetype ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Index into the archetype registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

/// The exact signature of an archetype.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArchetypeKey {
    /// Component types with a column.
    pub components: ComponentTypes,
    /// Tags, stored in the signature only.
    pub tags: Tags,
}

impl ArchetypeKey {
    /// The empty signature.
    pub const EMPTY: Self = Self {
        components: ComponentTypes::EMPTY,
        tags: Tags::EMPTY,
    };
}

/// Cached single-component transition out of an archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Edge {
    Add(ComponentIndex),
    Remove(ComponentIndex),
}

/// An archetype - a table storing entities with the same signature.
pub struct Archetype {
    /// Unique identifier for this archetype.
    id: ArchetypeId,
    key: ArchetypeKey,
    /// Component indices in ascending order, parallel to `columns`.
    component_ids: SmallVec<[ComponentIndex; 8]>,
    columns: Vec<Box<dyn ErasedColumn>>,
    /// Row to entity.
    entities: Vec<EntityId>,
    edges: HashMap<Edge, ArchetypeId, FxBuildHasher>,
}

impl Archetype {
    /// Create an archetype with one empty column per component of `key`.
    fn new(id: ArchetypeId, key: ArchetypeKey, registry: &TypeRegistry) -> Self {
        let mut component_ids = SmallVec::new();
        let mut columns = Vec::with_capacity(key.components.count());

        for index in key.components.iter() {
            if let Some(info) = registry.component_info(index) {
                component_ids.push(index);
                columns.push(info.new_column());
            }
        }
        debug_assert_eq!(columns.len(), key.components.count(), "unregistered component in key");

        Self {
            id,
            key,
            component_ids,
            columns,
            entities: Vec::new(),
            edges: HashMap::default(),
        }
    }

    /// Get the archetype ID.
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Get the signature.
    #[must_use]
    pub const fn key(&self) -> &ArchetypeKey {
        &self.key
    }

    /// Component types of this archetype.
    #[must_use]
    pub const fn component_types(&self) -> &ComponentTypes {
        &self.key.components
    }

    /// Tags of this archetype.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        &self.key.tags
    }

    /// Check if this archetype contains a component type.
    #[must_use]
    pub fn contains(&self, index: ComponentIndex) -> bool {
        self.key.components.contains(index)
    }

    /// Get the number of entities in this archetype.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the archetype is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get the entities in this archetype, in row order.
    #[must_use]
    pub fn entities(&self) -> ChunkEntities<'_> {
        ChunkEntities::new(&self.entities)
    }

    /// Entity stored at `row`.
    #[must_use]
    pub fn entity_at(&self, row: usize) -> Option<EntityId> {
        self.entities.get(row).copied()
    }

    fn column_index(&self, index: ComponentIndex) -> Option<usize> {
        self.component_ids.binary_search(&index).ok()
    }

    /// Typed column of component `index`.
    pub(crate) fn column<T: Component>(&self, index: ComponentIndex) -> Option<&TypedColumn<T>> {
        let col = self.column_index(index)?;
        self.columns[col].as_any().downcast_ref()
    }

    /// Typed column of component `index`, mutably.
    pub(crate) fn column_mut<T: Component>(
        &mut self,
        index: ComponentIndex,
    ) -> Option<&mut TypedColumn<T>> {
        let col = self.column_index(index)?;
        self.columns[col].as_any_mut().downcast_mut()
    }

    /// View over the `T` column, `None` if `T` is not part of the signature.
    #[must_use]
    pub fn chunk<T: Component>(&self, registry: &TypeRegistry) -> Option<Chunk<'_, T>> {
        let column = self.column::<T>(registry.component_index::<T>()?)?;
        Some(Chunk::new(column.backing(), column.len()))
    }

    /// Mutable view over the `T` column, `None` if `T` is not part of the signature.
    #[must_use]
    pub fn chunk_mut<T: Component>(&mut self, registry: &TypeRegistry) -> Option<ChunkMut<'_, T>> {
        let column = self.column_mut::<T>(registry.component_index::<T>()?)?;
        let len = column.len();
        Some(ChunkMut::new(column.backing_mut(), len))
    }

    /// Entity list and the `T` column, borrowed together.
    pub(crate) fn split_column_mut<T: Component>(
        &mut self,
        index: ComponentIndex,
    ) -> Option<(&[EntityId], &mut TypedColumn<T>)> {
        let col = self.column_index(index)?;
        let column = self.columns[col].as_any_mut().downcast_mut::<TypedColumn<T>>()?;
        Some((&self.entities, column))
    }

    /// Row entities and a mutable view over the `T` column.
    pub(crate) fn entities_and_chunk_mut<T: Component>(
        &mut self,
        index: ComponentIndex,
    ) -> Option<(ChunkEntities<'_>, ChunkMut<'_, T>)> {
        let (entities, column) = self.split_column_mut::<T>(index)?;
        let len = column.len();
        Some((ChunkEntities::new(entities), ChunkMut::new(column.backing_mut(), len)))
    }

    /// Row entities and mutable views over two distinct columns.
    pub(crate) fn entities_and_chunk2_mut<A: Component, B: Component>(
        &mut self,
        a: ComponentIndex,
        b: ComponentIndex,
    ) -> Option<(ChunkEntities<'_>, ChunkMut<'_, A>, ChunkMut<'_, B>)> {
        let (ca, cb) = (self.column_index(a)?, self.column_index(b)?);
        if ca == cb {
            return None;
        }
        let (left, right) = pair_mut(&mut self.columns, ca, cb);
        let left = left.as_any_mut().downcast_mut::<TypedColumn<A>>()?;
        let right = right.as_any_mut().downcast_mut::<TypedColumn<B>>()?;
        let (la, lb) = (left.len(), right.len());
        Some((
            ChunkEntities::new(&self.entities),
            ChunkMut::new(left.backing_mut(), la),
            ChunkMut::new(right.backing_mut(), lb),
        ))
    }

    /// Reserve capacity in all columns.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    /// Append an entity with no component data and return its row.
    ///
    /// Only valid for archetypes without components.
    pub(crate) fn push_bare(&mut self, entity: EntityId) -> usize {
        debug_assert!(self.columns.is_empty());
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Swap-remove `row` from every column and the entity list.
    ///
    /// Returns the entity that was moved into `row`, if any.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<EntityId> {
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    fn check_lockstep(&self) {
        debug_assert!(
            self.columns.iter().all(|c| c.len() == self.entities.len()),
            "columns of {:?} out of lockstep",
            self.id
        );
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("components", &self.key.components)
            .field("tags", &self.key.tags)
            .field("entity_count", &self.entities.len())
            .finish()
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut requires distinct indices");
    if a < b {
        let (head, tail) = items.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = items.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

/// Moves the row of `entity` from `src` to `dst`.
///
/// Shared columns are copied first, then `fill` writes the columns `dst` has
/// and `src` lacks, and only then is the source row reclaimed. Returns the
/// new row and the entity swapped into the vacated source row.
pub(crate) fn move_row(
    src: &mut Archetype,
    dst: &mut Archetype,
    row: usize,
    fill: impl FnOnce(&mut Archetype),
) -> (usize, Option<EntityId>) {
    let entity = src.entities[row];
    let new_row = dst.entities.len();
    dst.entities.push(entity);

    for (src_col, index) in src.component_ids.iter().enumerate() {
        if let Some(dst_col) = dst.column_index(*index) {
            src.columns[src_col].copy_row_to(row, dst.columns[dst_col].as_mut());
        }
    }
    fill(dst);
    dst.check_lockstep();

    let moved = src.swap_remove(row);
    src.check_lockstep();
    (new_row, moved)
}

/// Storage for all archetypes of a store.
///
/// Archetypes are never removed or renumbered, so the registry length only
/// grows and queries can scan just the archetypes created since their last
/// refresh.
pub struct ArchetypeStorage {
    archetypes: Vec<Archetype>,
    index: HashMap<ArchetypeKey, ArchetypeId, FxBuildHasher>,
}

impl Default for ArchetypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeStorage {
    /// Create new archetype storage with the empty archetype.
    #[must_use]
    pub fn new() -> Self {
        let mut storage = Self {
            archetypes: Vec::new(),
            index: HashMap::default(),
        };
        storage.create(ArchetypeKey::EMPTY, &TypeRegistry::new());
        storage
    }

    fn create(&mut self, key: ArchetypeKey, registry: &TypeRegistry) -> ArchetypeId {
        let id = ArchetypeId::from_raw(self.archetypes.len() as u32);
        self.archetypes.push(Archetype::new(id, key, registry));
        self.index.insert(key, id);
        debug!(?id, components = ?key.components, tags = ?key.tags, "created archetype");
        id
    }

    /// Get or create the archetype for `key`.
    pub fn get_or_create(&mut self, key: ArchetypeKey, registry: &TypeRegistry) -> ArchetypeId {
        match self.index.get(&key) {
            Some(&id) => id,
            None => self.create(key, registry),
        }
    }

    /// Find the archetype for `key`, if it exists.
    #[must_use]
    pub fn find(&self, key: &ArchetypeKey) -> Option<ArchetypeId> {
        self.index.get(key).copied()
    }

    /// Archetype reached from `base` by adding component `index`.
    pub fn with_component(
        &mut self,
        base: ArchetypeId,
        index: ComponentIndex,
        registry: &TypeRegistry,
    ) -> ArchetypeId {
        self.transition(base, Edge::Add(index), registry)
    }

    /// Archetype reached from `base` by removing component `index`.
    pub fn without_component(
        &mut self,
        base: ArchetypeId,
        index: ComponentIndex,
        registry: &TypeRegistry,
    ) -> ArchetypeId {
        self.transition(base, Edge::Remove(index), registry)
    }

    fn transition(&mut self, base: ArchetypeId, edge: Edge, registry: &TypeRegistry) -> ArchetypeId {
        let base_arch = &self.archetypes[base.index()];
        if let Some(&target) = base_arch.edges.get(&edge) {
            return target;
        }

        let mut key = base_arch.key;
        match edge {
            Edge::Add(index) => key.components.insert(index),
            Edge::Remove(index) => key.components.remove(index),
        };
        let target = self.get_or_create(key, registry);
        self.archetypes[base.index()].edges.insert(edge, target);
        target
    }

    /// Archetype with the components of `base` and the tag set `tags`.
    pub fn with_tags(&mut self, base: ArchetypeId, tags: Tags, registry: &TypeRegistry) -> ArchetypeId {
        let key = ArchetypeKey {
            components: self.archetypes[base.index()].key.components,
            tags,
        };
        self.get_or_create(key, registry)
    }

    /// Get an archetype by ID.
    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Get a mutable archetype by ID.
    #[must_use]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    /// Two distinct archetypes, mutably.
    pub(crate) fn pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut Archetype, &mut Archetype) {
        pair_mut(&mut self.archetypes, a.index(), b.index())
    }

    /// Get the number of archetypes, the empty archetype included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Always false: the empty archetype exists from the start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// All archetypes, indexed by id.
    #[must_use]
    pub fn as_slice(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// All archetypes, mutably.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    /// Iterate over all archetypes.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }
}

impl fmt::Debug for ArchetypeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeStorage")
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}
