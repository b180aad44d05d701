//! Tag and component predicates of a query.
//!
//! The same four-set predicate is applied to the tags and to the component
//! types of an archetype. `any` takes precedence over `all`: when `any` is
//! set, an archetype holding one of its members matches even if it lacks
//! some of `all`. The two exclusion sets are checked independently.

use crate::{
    archetype::ArchetypeKey,
    bitset::{BitSet256, ComponentTypes, Tags},
};

/// Four-set predicate over one kind of bitset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SetFilter<S> {
    /// Members that must all be present, unless `any` matches.
    pub all: S,
    /// Members of which at least one must be present, when non-empty.
    pub any: S,
    /// Reject sets holding every one of these, when non-empty.
    pub without_all: S,
    /// Reject sets holding any of these.
    pub without_any: S,
}

impl<S: AsRef<BitSet256>> SetFilter<S> {
    /// Test an archetype's actual set.
    #[must_use]
    pub fn matches(&self, actual: &S) -> bool {
        let actual = actual.as_ref();
        let (all, any) = (self.all.as_ref(), self.any.as_ref());
        let without_all = self.without_all.as_ref();

        let included = if any.is_empty() {
            actual.has_all(all)
        } else {
            actual.has_any(any) || (!all.is_empty() && actual.has_all(all))
        };
        if !included || actual.has_any(self.without_any.as_ref()) {
            return false;
        }
        without_all.is_empty() || !actual.has_all(without_all)
    }

    /// Check if the predicate accepts every set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.as_ref().is_empty()
            && self.any.as_ref().is_empty()
            && self.without_all.as_ref().is_empty()
            && self.without_any.as_ref().is_empty()
    }
}

/// Tag and component predicates applied on top of a query's required
/// components.
///
/// ```ignore
/// let filter = QueryFilter::new()
///     .any_tags(store.tags::<(Player, Npc)>()?)
///     .without_any_tags(store.tags::<(Dead,)>()?);
/// let mut query = store.query_filtered::<(Position,)>(filter)?;
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueryFilter {
    /// Predicate over archetype tags.
    pub tags: SetFilter<Tags>,
    /// Predicate over archetype component types.
    pub components: SetFilter<ComponentTypes>,
}

macro_rules! builder {
    ($($(#[$meta:meta])* $name:ident => $kind:ident.$field:ident: $ty:ty;)*) => {
        $(
            $(#[$meta])*
            #[must_use]
            pub const fn $name(mut self, set: $ty) -> Self {
                self.$kind.$field = set;
                self
            }
        )*
    };
}

impl QueryFilter {
    /// A filter accepting every archetype.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tags: SetFilter {
                all: Tags::EMPTY,
                any: Tags::EMPTY,
                without_all: Tags::EMPTY,
                without_any: Tags::EMPTY,
            },
            components: SetFilter {
                all: ComponentTypes::EMPTY,
                any: ComponentTypes::EMPTY,
                without_all: ComponentTypes::EMPTY,
                without_any: ComponentTypes::EMPTY,
            },
        }
    }

    builder! {
        /// Require every tag of `set`.
        all_tags => tags.all: Tags;
        /// Require at least one tag of `set`.
        any_tags => tags.any: Tags;
        /// Reject archetypes holding every tag of `set`.
        without_all_tags => tags.without_all: Tags;
        /// Reject archetypes holding any tag of `set`.
        without_any_tags => tags.without_any: Tags;
        /// Require every component of `set`.
        all_components => components.all: ComponentTypes;
        /// Require at least one component of `set`.
        any_components => components.any: ComponentTypes;
        /// Reject archetypes holding every component of `set`.
        without_all_components => components.without_all: ComponentTypes;
        /// Reject archetypes holding any component of `set`.
        without_any_components => components.without_any: ComponentTypes;
    }

    /// Test an archetype signature against both predicates.
    #[must_use]
    pub fn matches(&self, key: &ArchetypeKey) -> bool {
        self.tags.matches(&key.tags) && self.components.matches(&key.components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentIndex, TagIndex};

    fn tags(indices: &[usize]) -> Tags {
        indices.iter().map(|&i| TagIndex::from_usize(i)).collect()
    }

    fn components(indices: &[usize]) -> ComponentTypes {
        indices.iter().map(|&i| ComponentIndex::from_usize(i)).collect()
    }

    fn key(tag_indices: &[usize]) -> ArchetypeKey {
        ArchetypeKey {
            components: ComponentTypes::EMPTY,
            tags: tags(tag_indices),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = QueryFilter::new();
        assert_eq!(filter, QueryFilter::default());
        assert!(filter.tags.is_empty());
        assert!(filter.matches(&key(&[])));
        assert!(filter.matches(&key(&[1, 2, 3])));
    }

    #[test]
    fn test_any_takes_precedence_over_all() {
        // any = {A, B}, all = {C}
        let filter = QueryFilter::new().any_tags(tags(&[0, 1])).all_tags(tags(&[2]));

        assert!(filter.matches(&key(&[0])));
        assert!(filter.matches(&key(&[1, 3])));
        assert!(filter.matches(&key(&[2])));
        assert!(!filter.matches(&key(&[3])));
        assert!(!filter.matches(&key(&[])));
    }

    #[test]
    fn test_all_without_any() {
        let filter = QueryFilter::new().all_tags(tags(&[0, 1]));

        assert!(filter.matches(&key(&[0, 1])));
        assert!(filter.matches(&key(&[0, 1, 5])));
        assert!(!filter.matches(&key(&[0])));
    }

    #[test]
    fn test_exclusions_are_independent() {
        let filter = QueryFilter::new()
            .any_tags(tags(&[0]))
            .without_any_tags(tags(&[1]))
            .without_all_tags(tags(&[2, 3]));

        assert!(filter.matches(&key(&[0])));
        assert!(!filter.matches(&key(&[0, 1])));
        assert!(filter.matches(&key(&[0, 2])));
        assert!(!filter.matches(&key(&[0, 2, 3])));
    }

    #[test]
    fn test_component_predicate() {
        let filter = QueryFilter::new()
            .any_components(components(&[4, 5]))
            .without_any_components(components(&[9]));

        let with = |c: &[usize]| ArchetypeKey {
            components: components(c),
            tags: Tags::EMPTY,
        };
        assert!(filter.matches(&with(&[4])));
        assert!(!filter.matches(&with(&[1])));
        assert!(!filter.matches(&with(&[5, 9])));
    }
}
