//! Entity store - the main container for all entity data.
//!
//! The store owns the node table, the type registry and the archetype
//! registry. Every structural mutation (creating or deleting entities, adding
//! or removing components and tags, tree edits) goes through `&mut
//! EntityStore` and moves at most one row between archetypes.

use tracing::{debug, trace};

use crate::{
    archetype::{self, Archetype, ArchetypeId, ArchetypeKey, ArchetypeStorage},
    bitset::{ComponentTypes, Tags},
    component::{Component, ComponentBundle, ComponentIndex, Tag, TagBundle, TagIndex, TypeRegistry},
    config::StoreConfig,
    entity::{Entity, EntityId, EntityLocation, EntityNode, EntityTable, NodeFlags, Pid, StoreId},
    error::{EcsError, EcsResult},
    events::{ChangeListener, ListenerId, Listeners, StructuralChange},
    filter::QueryFilter,
    pid::PidAllocator,
    query::ArchetypeQuery,
};

/// Result of [`EntityStore::add_component`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The component type was new; the entity moved to another archetype.
    Added,
    /// The entity already had the component; its value was replaced in place.
    Updated,
}

/// The entity store - container for all entities, components and tags.
pub struct EntityStore {
    pub(crate) id: StoreId,
    pub(crate) config: StoreConfig,
    pub(crate) registry: TypeRegistry,
    pub(crate) archetypes: ArchetypeStorage,
    pub(crate) nodes: EntityTable,
    pub(crate) pids: PidAllocator,
    pub(crate) listeners: Listeners,
    pub(crate) root: Option<EntityId>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Create a store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store from `config`.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        let id = StoreId::next();
        debug!(
            store = id.as_raw(),
            pid_strategy = ?config.pid_strategy,
            recycle_ids = config.recycle_ids,
            "created entity store"
        );
        Self {
            id,
            registry: TypeRegistry::new(),
            archetypes: ArchetypeStorage::new(),
            nodes: EntityTable::new(config.initial_capacity, config.recycle_ids),
            pids: PidAllocator::new(config.pid_strategy, config.pid_seed),
            listeners: Listeners::default(),
            root: None,
            config,
        }
    }

    /// Identity of this store.
    #[must_use]
    pub const fn id(&self) -> StoreId {
        self.id
    }

    /// Configuration the store was created with.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ==================== Entity Operations ====================

    /// Create an entity with the next free id in the empty archetype.
    pub fn create_entity(&mut self) -> Entity {
        let id = self.nodes.allocate();
        self.attach_new(id)
    }

    /// Create an entity with a caller-chosen id.
    ///
    /// The node table grows to hold `id`, which must not exceed
    /// [`MAX_CLAIMED_ID`](crate::MAX_CLAIMED_ID).
    pub fn create_entity_with_id(&mut self, id: u32) -> EcsResult<Entity> {
        let id = self.nodes.claim(id)?;
        Ok(self.attach_new(id))
    }

    fn attach_new(&mut self, id: EntityId) -> Entity {
        let row = self.archetype_mut(ArchetypeId::EMPTY).push_bare(id);
        let pid = self.pids.assign(id);

        let node = self.nodes.node_mut(id);
        node.archetype = Some(ArchetypeId::EMPTY);
        node.row = row;
        node.pid = pid;
        node.flags = NodeFlags::CREATED;
        self.nodes.mark_alive();

        trace!(entity = %id, ?pid, "created entity");
        self.listeners.emit(StructuralChange::EntityCreated(id));
        Entity::new(id, self.id)
    }

    /// Delete an entity.
    ///
    /// The entity is removed from its parent's child list and its children
    /// become floating, each with a notification, before its row is removed.
    pub fn delete_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let id = self.resolve(entity)?;
        self.unlink_tree(id);

        let location = self.location_of(id)?;
        if let Some(moved) = self.archetype_mut(location.archetype).swap_remove(location.row) {
            self.nodes.node_mut(moved).row = location.row;
        }

        let pid = self.nodes.node_mut(id).pid;
        self.pids.release(pid);
        if self.root == Some(id) {
            self.root = None;
        }
        self.nodes.release(id);

        trace!(entity = %id, "deleted entity");
        self.listeners.emit(StructuralChange::EntityDeleted(id));
        Ok(())
    }

    /// Check if an entity of this store is alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        entity.store() == self.id && self.nodes.is_alive(entity.id())
    }

    /// Handle for a live entity id.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.nodes
            .is_alive(id)
            .then_some(Entity::new(id, self.id))
    }

    /// Node record of a live entity.
    pub fn node(&self, entity: Entity) -> EcsResult<&EntityNode> {
        let id = self.resolve(entity)?;
        self.nodes.live(id)
    }

    /// Archetype and row of a live entity.
    pub fn location(&self, entity: Entity) -> EcsResult<EntityLocation> {
        let id = self.resolve(entity)?;
        self.location_of(id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.nodes.alive_count()
    }

    /// Number of node slots, live or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Iterate over all live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.nodes.alive_ids().map(|id| Entity::new(id, self.id))
    }

    /// Permanent id of a live entity.
    pub fn pid_of(&self, entity: Entity) -> EcsResult<Pid> {
        Ok(self.node(entity)?.pid)
    }

    /// Live entity with the given permanent id.
    #[must_use]
    pub fn entity_by_pid(&self, pid: Pid) -> Option<Entity> {
        let id = self.pids.lookup(pid)?;
        self.nodes
            .get(id)
            .filter(|node| node.is_alive() && node.pid == pid)
            .map(|_| Entity::new(id, self.id))
    }

    /// Check the handle belongs to this store and is alive.
    pub(crate) fn resolve(&self, entity: Entity) -> EcsResult<EntityId> {
        if entity.store() != self.id {
            return Err(EcsError::ForeignEntity {
                entity: entity.id(),
                entity_store: entity.store(),
                store: self.id,
            });
        }
        self.nodes.live(entity.id())?;
        Ok(entity.id())
    }

    pub(crate) fn location_of(&self, id: EntityId) -> EcsResult<EntityLocation> {
        self.nodes
            .live(id)?
            .location()
            .ok_or(EcsError::Detached(id))
    }

    // ==================== Type Registration ====================

    /// The store's type registry.
    #[must_use]
    pub const fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register a component type.
    pub fn register_component<T: Component>(&mut self) -> EcsResult<ComponentIndex> {
        self.registry.register_component::<T>()
    }

    /// Register a tag type.
    pub fn register_tag<T: Tag>(&mut self) -> EcsResult<TagIndex> {
        self.registry.register_tag::<T>()
    }

    /// Component set of a bundle, registering its members.
    pub fn component_types<B: ComponentBundle>(&mut self) -> EcsResult<ComponentTypes> {
        B::register(&mut self.registry)
    }

    /// Tag set of a bundle, registering its members.
    pub fn tags<B: TagBundle>(&mut self) -> EcsResult<Tags> {
        B::register(&mut self.registry)
    }

    // ==================== Component Operations ====================

    /// Add a component to an entity.
    ///
    /// If the entity already has this component type, the value is replaced
    /// in place and [`AddOutcome::Updated`] is returned.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<AddOutcome> {
        let id = self.resolve(entity)?;
        let index = self.registry.register_component::<T>()?;
        let location = self.location_of(id)?;

        if let Some(column) = self.archetype_mut(location.archetype).column_mut::<T>(index) {
            if let Some(slot) = column.get_mut(location.row) {
                *slot = value;
                self.listeners.emit(StructuralChange::ComponentUpdated { entity: id, component: index });
                return Ok(AddOutcome::Updated);
            }
        }

        let target = self
            .archetypes
            .with_component(location.archetype, index, &self.registry);
        self.move_entity(id, location, target, |dst| {
            if let Some(column) = dst.column_mut::<T>(index) {
                column.push(value);
            }
        });

        self.listeners.emit(StructuralChange::ComponentAdded { entity: id, component: index });
        Ok(AddOutcome::Added)
    }

    /// Add a default-valued component to an entity.
    pub fn add_component_default<T: Component + Default>(&mut self, entity: Entity) -> EcsResult<AddOutcome> {
        self.add_component(entity, T::default())
    }

    /// Remove a component from an entity.
    ///
    /// Returns the removed value, or `None` without moving the entity if it
    /// had no such component.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> EcsResult<Option<T>> {
        let id = self.resolve(entity)?;
        let Some(index) = self.registry.component_index::<T>() else {
            return Ok(None);
        };
        let location = self.location_of(id)?;

        let Some(value) = self
            .archetype(location.archetype)
            .and_then(|arch| arch.column::<T>(index))
            .and_then(|column| column.get(location.row).copied())
        else {
            return Ok(None);
        };

        let target = self
            .archetypes
            .without_component(location.archetype, index, &self.registry);
        self.move_entity(id, location, target, |_| {});

        self.listeners.emit(StructuralChange::ComponentRemoved { entity: id, component: index });
        Ok(Some(value))
    }

    /// Get a component of an entity.
    pub fn get<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        let id = self.resolve(entity)?;
        let location = self.location_of(id)?;
        self.registry
            .component_index::<T>()
            .and_then(|index| self.archetype(location.archetype)?.column::<T>(index))
            .and_then(|column| column.get(location.row))
            .ok_or(EcsError::ComponentNotFound {
                entity: id,
                component: std::any::type_name::<T>(),
            })
    }

    /// Get a component of an entity mutably.
    ///
    /// Writing through the reference is not a structural change and fires no
    /// notification.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let id = self.resolve(entity)?;
        let location = self.location_of(id)?;
        let not_found = EcsError::ComponentNotFound {
            entity: id,
            component: std::any::type_name::<T>(),
        };
        let Some(index) = self.registry.component_index::<T>() else {
            return Err(not_found);
        };
        self.archetype_mut(location.archetype)
            .column_mut::<T>(index)
            .and_then(|column| column.get_mut(location.row))
            .ok_or(not_found)
    }

    /// Check if an entity has a component.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        let Some(index) = self.registry.component_index::<T>() else {
            return false;
        };
        self.component_types_of(entity)
            .is_ok_and(|types| types.contains(index))
    }

    /// Component types of an entity.
    pub fn component_types_of(&self, entity: Entity) -> EcsResult<ComponentTypes> {
        Ok(self.signature_of(entity)?.components)
    }

    // ==================== Tag Operations ====================

    /// Add every tag of `tags` to an entity in one transition.
    ///
    /// Returns `false` without moving the entity if it already had them all.
    pub fn add_tags(&mut self, entity: Entity, tags: &Tags) -> EcsResult<bool> {
        let id = self.resolve(entity)?;
        let location = self.location_of(id)?;
        let current = self.archetype_key(location.archetype).tags;
        let next = current.union(tags);
        self.change_tags(id, location, current, next)
    }

    /// Remove every tag of `tags` from an entity in one transition.
    ///
    /// Returns `false` without moving the entity if it had none of them.
    pub fn remove_tags(&mut self, entity: Entity, tags: &Tags) -> EcsResult<bool> {
        let id = self.resolve(entity)?;
        let location = self.location_of(id)?;
        let current = self.archetype_key(location.archetype).tags;
        let next = current.difference(tags);
        self.change_tags(id, location, current, next)
    }

    /// Add tag `T` to an entity.
    pub fn add_tag<T: Tag>(&mut self, entity: Entity) -> EcsResult<bool> {
        let index = self.registry.register_tag::<T>()?;
        self.add_tags(entity, &Tags::single(index))
    }

    /// Remove tag `T` from an entity.
    pub fn remove_tag<T: Tag>(&mut self, entity: Entity) -> EcsResult<bool> {
        match self.registry.tag_index::<T>() {
            Some(index) => self.remove_tags(entity, &Tags::single(index)),
            None => self.resolve(entity).map(|_| false),
        }
    }

    /// Check if an entity has tag `T`.
    #[must_use]
    pub fn has_tag<T: Tag>(&self, entity: Entity) -> bool {
        let Some(index) = self.registry.tag_index::<T>() else {
            return false;
        };
        self.tags_of(entity).is_ok_and(|tags| tags.contains(index))
    }

    /// Tags of an entity.
    pub fn tags_of(&self, entity: Entity) -> EcsResult<Tags> {
        Ok(self.signature_of(entity)?.tags)
    }

    fn change_tags(
        &mut self,
        id: EntityId,
        location: EntityLocation,
        current: Tags,
        next: Tags,
    ) -> EcsResult<bool> {
        if next == current {
            return Ok(false);
        }

        let target = self
            .archetypes
            .with_tags(location.archetype, next, &self.registry);
        self.move_entity(id, location, target, |_| {});

        self.listeners.emit(StructuralChange::TagsChanged {
            entity: id,
            added: next.difference(&current),
            removed: current.difference(&next),
        });
        Ok(true)
    }

    // ==================== Archetype Access ====================

    /// Get an archetype by ID.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// All archetypes of the store.
    #[must_use]
    pub const fn archetypes(&self) -> &ArchetypeStorage {
        &self.archetypes
    }

    /// Number of archetypes ever created, the empty archetype included.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    fn archetype_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes.as_mut_slice()[id.index()]
    }

    fn archetype_key(&self, id: ArchetypeId) -> ArchetypeKey {
        *self.archetypes.as_slice()[id.index()].key()
    }

    fn signature_of(&self, entity: Entity) -> EcsResult<ArchetypeKey> {
        let location = self.location(entity)?;
        Ok(self.archetype_key(location.archetype))
    }

    /// Move the row of `id` to `target` and fix both affected nodes.
    fn move_entity(
        &mut self,
        id: EntityId,
        from: EntityLocation,
        target: ArchetypeId,
        fill: impl FnOnce(&mut Archetype),
    ) {
        debug_assert_ne!(from.archetype, target);
        let (src, dst) = self.archetypes.pair_mut(from.archetype, target);
        let (new_row, moved) = archetype::move_row(src, dst, from.row, fill);

        if let Some(moved) = moved {
            self.nodes.node_mut(moved).row = from.row;
        }
        let node = self.nodes.node_mut(id);
        node.archetype = Some(target);
        node.row = new_row;

        trace!(
            entity = %id,
            from = ?from.archetype,
            to = ?target,
            row = new_row,
            "moved entity"
        );
    }

    // ==================== Notifications ====================

    /// Subscribe to structural changes.
    pub fn subscribe(&mut self, listener: impl ChangeListener) -> ListenerId {
        self.listeners.subscribe(Box::new(listener))
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // ==================== Queries ====================

    /// Build a query over archetypes holding every component of `B`.
    pub fn query<B: ComponentBundle>(&mut self) -> EcsResult<ArchetypeQuery> {
        self.query_filtered::<B>(QueryFilter::new())
    }

    /// Build a query over archetypes holding every component of `B` and
    /// matching `filter`.
    pub fn query_filtered<B: ComponentBundle>(&mut self, filter: QueryFilter) -> EcsResult<ArchetypeQuery> {
        let required = B::register(&mut self.registry)?;
        Ok(ArchetypeQuery::new(self.id, required, filter))
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("id", &self.id)
            .field("entity_count", &self.entity_count())
            .field("archetype_count", &self.archetypes.len())
            .field("component_types", &self.registry.component_count())
            .field("tag_types", &self.registry.tag_count())
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}
