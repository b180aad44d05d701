#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::float_cmp)]

//! Strata ECS - archetype-based entity store
//!
//! Entities with the same set of component types and tags share an
//! archetype, which stores every component type as one dense column. Adding
//! or removing a component or tag moves the entity's row to another
//! archetype; queries iterate whole columns as chunks.
//!
//! # Key Concepts
//!
//! - **Entity**: a dense per-store id plus a handle tagged with its store
//! - **Component**: plain `Copy` data stored in columns
//! - **Tag**: a zero-sized marker that is part of the archetype signature
//! - **Archetype**: all entities sharing one component set and one tag set
//! - **Chunk**: a view over one column, padded for SIMD lanes
//! - **Query**: an incrementally refreshed list of matching archetypes
//!
//! # Example
//!
//! ```ignore
//! let mut store = EntityStore::new();
//! let e = store.create_entity();
//! store.add_component(e, Position { x: 0.0, y: 0.0 })?;
//! store.add_component(e, Velocity { x: 1.0, y: 0.0 })?;
//!
//! let mut query = store.query::<(Position, Velocity)>()?;
//! query.par_for_each_chunk_mut::<Position, _>(&mut store, ParallelJobRunner::global(), |_, mut chunk| {
//!     for p in chunk.iter_mut() {
//!         p.x += 1.0;
//!     }
//! })?;
//! ```

mod archetype;
mod bitset;
mod chunk;
mod column;
mod component;
mod config;
mod entity;
mod error;
mod events;
mod filter;
mod pid;
mod query;
mod store;
mod tree;

pub use archetype::{Archetype, ArchetypeId, ArchetypeKey, ArchetypeStorage};
pub use bitset::{BitSet256, ComponentTypes, MAX_TYPES, Tags};
pub use chunk::{Chunk, ChunkEntities, ChunkMut, LaneWidth, padded_len};
pub use column::{ErasedColumn, TypedColumn};
pub use component::{
    Component, ComponentBundle, ComponentIndex, ComponentInfo, MAX_LANE_BYTES, Tag, TagBundle,
    TagIndex, TagInfo, TypeRegistry,
};
pub use config::{PidStrategy, StoreConfig};
pub use entity::{
    Entity, EntityId, EntityLocation, EntityNode, MAX_CLAIMED_ID, NodeFlags, Pid, StoreId,
};
pub use error::{EcsError, EcsResult};
pub use events::{ChangeListener, ListenerId, StructuralChange};
pub use filter::{QueryFilter, SetFilter};
pub use query::ArchetypeQuery;
pub use store::{AddOutcome, EntityStore};
pub use strata_jobs::ParallelJobRunner;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ArchetypeQuery, Component, Entity, EntityStore, ParallelJobRunner, QueryFilter, StoreConfig,
        StructuralChange, Tag,
    };
}
