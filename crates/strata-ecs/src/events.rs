//! Structural change notifications.
//!
//! Listeners run synchronously, exactly once per logical change, before the
//! mutating call returns.

use std::fmt;

use crate::{
    bitset::Tags,
    component::ComponentIndex,
    entity::EntityId,
};

/// A structural change of an entity store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructuralChange {
    /// An entity was created.
    EntityCreated(EntityId),
    /// An entity was deleted. Fired after every tree link was removed.
    EntityDeleted(EntityId),
    /// A component type was added, moving the entity to a new archetype.
    ComponentAdded {
        /// Target entity.
        entity: EntityId,
        /// Added component type.
        component: ComponentIndex,
    },
    /// The value of an existing component was replaced in place.
    ComponentUpdated {
        /// Target entity.
        entity: EntityId,
        /// Updated component type.
        component: ComponentIndex,
    },
    /// A component type was removed.
    ComponentRemoved {
        /// Target entity.
        entity: EntityId,
        /// Removed component type.
        component: ComponentIndex,
    },
    /// The tag set of an entity changed.
    TagsChanged {
        /// Target entity.
        entity: EntityId,
        /// Tags the entity did not have before.
        added: Tags,
        /// Tags the entity no longer has.
        removed: Tags,
    },
    /// `child` was inserted into the child list of `parent` at `index`.
    ChildAdded {
        /// New parent.
        parent: EntityId,
        /// Attached entity.
        child: EntityId,
        /// Position in the child list.
        index: usize,
    },
    /// `child` was removed from the child list of `parent` at `index`.
    ChildRemoved {
        /// Former parent.
        parent: EntityId,
        /// Detached entity.
        child: EntityId,
        /// Former position in the child list.
        index: usize,
    },
}

/// Identifier of a subscribed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

impl ListenerId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Receives structural changes.
pub trait ChangeListener: Send + 'static {
    /// Handle one change.
    fn on_change(&mut self, change: &StructuralChange);
}

impl<F> ChangeListener for F
where
    F: FnMut(&StructuralChange) + Send + 'static,
{
    fn on_change(&mut self, change: &StructuralChange) {
        self(change);
    }
}

/// Subscribed listeners in subscription order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u32,
    entries: Vec<(ListenerId, Box<dyn ChangeListener>)>,
}

impl Listeners {
    pub(crate) fn subscribe(&mut self, listener: Box<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&mut self, change: StructuralChange) {
        for (_, listener) in &mut self.entries {
            listener.on_change(&change);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}
