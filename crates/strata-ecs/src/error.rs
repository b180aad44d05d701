//! Entity store error types.

use thiserror::Error;

use crate::entity::{EntityId, StoreId};

/// Entity store error type.
#[derive(Debug, Error)]
pub enum EcsError {
    /// Entity ids start at 1; 0 is the null entity.
    #[error("invalid entity id {0}: ids must be greater than 0")]
    InvalidEntityId(u32),

    /// A caller-chosen id is past the largest claimable id.
    #[error("entity id {id} exceeds the largest claimable id {max}")]
    EntityIdTooLarge {
        /// Requested id.
        id: u32,
        /// Largest accepted id.
        max: u32,
    },

    /// A caller-chosen id is already taken by a live entity.
    #[error("entity id {0} is already in use")]
    EntityIdInUse(EntityId),

    /// The entity handle belongs to a different store.
    #[error("entity {entity} belongs to store {entity_store:?}, not {store:?}")]
    ForeignEntity {
        /// Offending entity.
        entity: EntityId,
        /// Store that created the entity.
        entity_store: StoreId,
        /// Store the operation was issued against.
        store: StoreId,
    },

    /// The entity was deleted or never existed.
    #[error("entity {0} is detached")]
    Detached(EntityId),

    /// The entity has no component of the requested type.
    #[error("entity {entity} has no component {component}")]
    ComponentNotFound {
        /// Entity that was queried.
        entity: EntityId,
        /// Type name of the missing component.
        component: &'static str,
    },

    /// Child insertion index past the end of the child list.
    #[error("child index {index} out of range for {len} children")]
    ChildIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Current number of children.
        len: usize,
    },

    /// Row index past the end of a chunk.
    #[error("chunk index {index} out of range for length {len}")]
    ChunkIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Chunk length.
        len: usize,
    },

    /// Attaching `child` below `parent` would make the tree cyclic.
    #[error("cannot attach {child} below {parent}: {child} is an ancestor of {parent}")]
    CycleDetected {
        /// Requested parent.
        parent: EntityId,
        /// Requested child.
        child: EntityId,
    },

    /// The store root must not have a parent, either when it is set or afterwards.
    #[error("store root {0} cannot have a parent")]
    RootHasParent(EntityId),

    /// Every bit of the signature bitset is taken.
    #[error("cannot register more than {limit} {kind} types")]
    TypeLimitExceeded {
        /// `"component"` or `"tag"`.
        kind: &'static str,
        /// Maximum number of types.
        limit: usize,
    },

    /// Store configuration could not be parsed.
    #[error("invalid store config: {0}")]
    Config(#[from] serde_json::Error),

    /// Parallel iteration failed to run.
    #[error("parallel job failed: {0}")]
    Job(#[from] strata_jobs::JobError),
}

/// Result type for entity store operations.
pub type EcsResult<T> = Result<T, EcsError>;
