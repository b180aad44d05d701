//! Incremental archetype matching and chunk iteration.
//!
//! A query caches the ids of the archetypes it matched, together with the
//! number of archetypes the store had at that point. Archetypes are never
//! removed or renumbered, so a refresh only has to test the ones created
//! since the last call:
//!
//! ```ignore
//! let mut query = store.query::<(Position, Velocity)>()?;
//!
//! query.for_each_chunk2_mut::<Position, Velocity, _>(&mut store, |_, mut pos, vel| {
//!     for (p, v) in pos.iter_mut().zip(vel.iter()) {
//!         p.x += v.x;
//!     }
//! });
//! ```
//!
//! Changing the filter drops the cache and the next use rescans every
//! archetype.

use std::fmt;

use strata_jobs::{ParallelJobRunner, partition};
use tracing::trace;

use crate::{
    archetype::{Archetype, ArchetypeId},
    bitset::{ComponentTypes, Tags},
    chunk::{Chunk, ChunkEntities, ChunkMut},
    component::Component,
    entity::{Entity, StoreId},
    error::EcsResult,
    filter::QueryFilter,
    store::EntityStore,
};

/// A reusable query over the archetypes of one store.
///
/// Build it once with [`EntityStore::query`] and keep it around; every
/// execution helper refreshes the match cache first.
pub struct ArchetypeQuery {
    store: StoreId,
    required: ComponentTypes,
    filter: QueryFilter,
    matched: Vec<ArchetypeId>,
    last_count: usize,
    version: u64,
}

macro_rules! filter_setter {
    ($($(#[$meta:meta])* $name:ident => $kind:ident.$field:ident: $ty:ty;)*) => {
        $(
            $(#[$meta])*
            pub fn $name(&mut self, set: $ty) {
                self.filter.$kind.$field = set;
                self.invalidate();
            }
        )*
    };
}

impl ArchetypeQuery {
    pub(crate) fn new(store: StoreId, required: ComponentTypes, filter: QueryFilter) -> Self {
        Self {
            store,
            required,
            filter,
            matched: Vec::new(),
            last_count: 0,
            version: 0,
        }
    }

    /// Store this query was built for.
    #[must_use]
    pub const fn store(&self) -> StoreId {
        self.store
    }

    /// Components every matched archetype holds.
    #[must_use]
    pub const fn required(&self) -> &ComponentTypes {
        &self.required
    }

    /// Filter applied on top of the required components.
    #[must_use]
    pub const fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    /// Bumped on every filter change.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Replace the whole filter.
    pub fn set_filter(&mut self, filter: QueryFilter) {
        self.filter = filter;
        self.invalidate();
    }

    filter_setter! {
        set_all_tags => tags.all: Tags;
        set_any_tags => tags.any: Tags;
        set_without_all_tags => tags.without_all: Tags;
        set_without_any_tags => tags.without_any: Tags;
        set_all_components => components.all: ComponentTypes;
        set_any_components => components.any: ComponentTypes;
        set_without_all_components => components.without_all: ComponentTypes;
        set_without_any_components => components.without_any: ComponentTypes;
    }

    fn invalidate(&mut self) {
        self.version += 1;
        self.matched.clear();
        self.last_count = 0;
    }

    /// Check an archetype against the required components and the filter.
    #[must_use]
    pub fn matches(&self, archetype: &Archetype) -> bool {
        archetype.component_types().has_all(&self.required) && self.filter.matches(archetype.key())
    }

    /// Ids of all matching archetypes, in creation order.
    ///
    /// # Panics
    ///
    /// Panics if `store` is not the store the query was built for.
    pub fn archetypes(&mut self, store: &EntityStore) -> &[ArchetypeId] {
        self.refresh(store);
        &self.matched
    }

    fn refresh(&mut self, store: &EntityStore) {
        assert!(
            store.id() == self.store,
            "query built for {:?} used with {:?}",
            self.store,
            store.id()
        );

        let archetypes = store.archetypes().as_slice();
        if archetypes.len() == self.last_count {
            return;
        }

        let before = self.matched.len();
        for archetype in &archetypes[self.last_count..] {
            if self.matches(archetype) {
                self.matched.push(archetype.id());
            }
        }
        trace!(
            scanned = archetypes.len() - self.last_count,
            matched = self.matched.len() - before,
            "refreshed query"
        );
        self.last_count = archetypes.len();
    }

    /// Number of entities in all matching archetypes.
    pub fn entity_count(&mut self, store: &EntityStore) -> usize {
        self.refresh(store);
        self.matched
            .iter()
            .filter_map(|&id| store.archetype(id))
            .map(Archetype::len)
            .sum()
    }

    /// Iterate over the entities of all matching archetypes.
    pub fn entities<'a>(&'a mut self, store: &'a EntityStore) -> impl Iterator<Item = Entity> + 'a {
        self.refresh(store);
        let store_id = self.store;
        self.matched
            .iter()
            .filter_map(move |&id| store.archetype(id))
            .flat_map(move |archetype| {
                archetype
                    .entities()
                    .into_iter()
                    .map(move |&id| Entity::new(id, store_id))
            })
    }

    /// Iterate over the non-empty `T` chunks of all matching archetypes.
    ///
    /// Archetypes without a `T` column are skipped.
    pub fn chunks<'a, T: Component>(
        &'a mut self,
        store: &'a EntityStore,
    ) -> impl Iterator<Item = (ChunkEntities<'a>, Chunk<'a, T>)> + 'a {
        self.refresh(store);
        self.matched.iter().filter_map(move |&id| {
            let archetype = store.archetype(id)?;
            if archetype.is_empty() {
                return None;
            }
            Some((archetype.entities(), archetype.chunk::<T>(store.registry())?))
        })
    }

    /// Run `body` on the mutable `T` chunk of every non-empty matching
    /// archetype.
    pub fn for_each_chunk_mut<T, F>(&mut self, store: &mut EntityStore, mut body: F)
    where
        T: Component,
        F: FnMut(ChunkEntities<'_>, ChunkMut<'_, T>),
    {
        self.refresh(store);
        let Some(index) = store.registry.component_index::<T>() else {
            return;
        };

        for &id in &self.matched {
            let Some(archetype) = store.archetypes.get_mut(id) else {
                continue;
            };
            if archetype.is_empty() {
                continue;
            }
            if let Some((entities, chunk)) = archetype.entities_and_chunk_mut::<T>(index) {
                body(entities, chunk);
            }
        }
    }

    /// Run `body` on two distinct mutable columns of every non-empty matching
    /// archetype.
    ///
    /// Archetypes missing either column are skipped, as is every archetype
    /// when `A` and `B` are the same type.
    pub fn for_each_chunk2_mut<A, B, F>(&mut self, store: &mut EntityStore, mut body: F)
    where
        A: Component,
        B: Component,
        F: FnMut(ChunkEntities<'_>, ChunkMut<'_, A>, ChunkMut<'_, B>),
    {
        self.refresh(store);
        let (Some(a), Some(b)) = (
            store.registry.component_index::<A>(),
            store.registry.component_index::<B>(),
        ) else {
            return;
        };

        for &id in &self.matched {
            let Some(archetype) = store.archetypes.get_mut(id) else {
                continue;
            };
            if archetype.is_empty() {
                continue;
            }
            if let Some((entities, ca, cb)) = archetype.entities_and_chunk2_mut::<A, B>(a, b) {
                body(entities, ca, cb);
            }
        }
    }

    /// Run `body` in parallel over the `T` column of every matching archetype.
    ///
    /// Each archetype is split into at most one partition per runner thread.
    /// Every partition except the last holds a whole number of 64-byte lanes,
    /// so padded views of neighbouring partitions never overlap. The last
    /// partition keeps the column's padding rows.
    pub fn par_for_each_chunk_mut<T, F>(
        &mut self,
        store: &mut EntityStore,
        runner: &ParallelJobRunner,
        body: F,
    ) -> EcsResult<()>
    where
        T: Component,
        F: Fn(ChunkEntities<'_>, ChunkMut<'_, T>) + Sync,
    {
        self.refresh(store);
        let Some(index) = store.registry.component_index::<T>() else {
            return Ok(());
        };
        let align = store
            .registry
            .component_info(index)
            .map_or(1, |info| info.lane_rows());

        for &id in &self.matched {
            let Some(archetype) = store.archetypes.get_mut(id) else {
                continue;
            };
            let Some((entities, column)) = archetype.split_column_mut::<T>(index) else {
                continue;
            };
            let len = column.len();
            if len == 0 {
                continue;
            }

            let ranges: Vec<_> = partition(len, runner.thread_count(), align)
                .into_iter()
                .filter(|range| !range.is_empty())
                .collect();
            let last = ranges.len() - 1;

            let mut rest = column.backing_mut();
            let mut tasks = Vec::with_capacity(ranges.len());
            for (i, range) in ranges.into_iter().enumerate() {
                let rows = range.len();
                let backing = if i == last {
                    std::mem::take(&mut rest)
                } else {
                    let (head, tail) = std::mem::take(&mut rest).split_at_mut(rows);
                    rest = tail;
                    head
                };
                tasks.push(Some((
                    ChunkEntities::new(&entities[range]),
                    ChunkMut::new(backing, rows),
                )));
            }

            trace!(archetype = ?id, rows = len, parts = tasks.len(), "running parallel chunk job");
            runner.run(&mut tasks, |_, task| {
                if let Some((entities, chunk)) = task.take() {
                    body(entities, chunk);
                }
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ArchetypeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeQuery")
            .field("store", &self.store)
            .field("required", &self.required)
            .field("matched", &self.matched.len())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Tag;

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Health(u32);

    struct Enemy;
    impl Tag for Enemy {}

    fn spawn(store: &mut EntityStore, count: usize) -> Vec<Entity> {
        (0..count)
            .map(|i| {
                let e = store.create_entity();
                store.add_component(e, Position { x: i as f32, y: 0.0 }).unwrap();
                store.add_component(e, Velocity { x: 1.0, y: 2.0 }).unwrap();
                e
            })
            .collect()
    }

    #[test]
    fn test_cached_match_is_reused() {
        let mut store = EntityStore::new();
        spawn(&mut store, 3);
        let mut query = store.query::<(Position,)>().unwrap();

        let first = query.archetypes(&store).as_ptr();
        let len = query.archetypes(&store).len();
        let second = query.archetypes(&store).as_ptr();

        assert_eq!(len, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_refresh_picks_up_new_archetypes() {
        let mut store = EntityStore::new();
        let entities = spawn(&mut store, 2);
        let mut query = store.query::<(Position, Velocity)>().unwrap();
        assert_eq!(query.archetypes(&store).len(), 1);

        store.add_component(entities[0], Health(10)).unwrap();

        let matched = query.archetypes(&store).to_vec();
        assert_eq!(matched.len(), 2);
        assert_eq!(query.entity_count(&store), 2);
    }

    #[test]
    fn test_filter_change_bumps_version() {
        let mut store = EntityStore::new();
        let entities = spawn(&mut store, 2);
        store.add_tag::<Enemy>(entities[1]).unwrap();
        let enemy = store.tags::<(Enemy,)>().unwrap();

        let mut query = store.query::<(Position,)>().unwrap();
        assert_eq!(query.entity_count(&store), 2);
        assert_eq!(query.version(), 0);

        query.set_without_any_tags(enemy);
        assert_eq!(query.version(), 1);
        assert_eq!(query.entities(&store).collect::<Vec<_>>(), vec![entities[0]]);

        query.set_filter(QueryFilter::new().all_tags(enemy));
        assert_eq!(query.version(), 2);
        assert_eq!(query.entities(&store).collect::<Vec<_>>(), vec![entities[1]]);
    }

    #[test]
    fn test_chunks_skip_empty_archetypes() {
        let mut store = EntityStore::new();
        let entities = spawn(&mut store, 4);
        store.delete_entity(entities[0]).unwrap();

        let mut query = store.query::<(Position,)>().unwrap();
        let chunks: Vec<_> = query.chunks::<Position>(&store).collect();

        assert_eq!(chunks.len(), 1);
        let (ids, positions) = chunks[0];
        assert_eq!(positions.len(), 3);
        assert_eq!(ids.len(), 3);
        for (row, &id) in ids.iter().enumerate() {
            let entity = store.entity(id).unwrap();
            assert_eq!(store.get::<Position>(entity).unwrap(), &positions[row]);
        }
    }

    #[test]
    fn test_for_each_chunk2_mut() {
        let mut store = EntityStore::new();
        let entities = spawn(&mut store, 5);
        let mut query = store.query::<(Position, Velocity)>().unwrap();

        query.for_each_chunk2_mut::<Position, Velocity, _>(&mut store, |_, mut pos, vel| {
            for (p, v) in pos.iter_mut().zip(vel.as_slice()) {
                p.x += v.x;
                p.y += v.y;
            }
        });

        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(store.get::<Position>(e).unwrap(), &Position {
                x: i as f32 + 1.0,
                y: 2.0,
            });
        }
    }

    #[test]
    fn test_par_for_each_chunk_mut() {
        let mut store = EntityStore::new();
        let entities = spawn(&mut store, 1000);
        let runner = ParallelJobRunner::new(3).unwrap();
        let mut query = store.query::<(Position,)>().unwrap();

        query
            .par_for_each_chunk_mut::<Position, _>(&mut store, &runner, |ids, mut chunk| {
                assert_eq!(ids.len(), chunk.len());
                for p in chunk.iter_mut() {
                    p.y = p.x * 2.0;
                }
            })
            .unwrap();

        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(store.get::<Position>(e).unwrap().y, i as f32 * 2.0);
        }
    }

    #[test]
    #[should_panic(expected = "used with")]
    fn test_foreign_store_panics() {
        let mut a = EntityStore::new();
        let b = EntityStore::new();
        let mut query = a.query::<(Position,)>().unwrap();
        query.archetypes(&b);
    }
}
