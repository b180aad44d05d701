//! Component and tag type registration.
//!
//! Each store owns a [`TypeRegistry`] that hands out small, dense indices to
//! component and tag types at first use. Indices address bits of the
//! signature bitsets and select the column factory of a component type, so the
//! hot path never dispatches on `TypeId` more than once per call.

use std::{any::TypeId, fmt};

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::{
    bitset::{ComponentTypes, MAX_TYPES, Tags},
    column::{ErasedColumn, TypedColumn},
    error::{EcsError, EcsResult},
};

/// Byte width of the widest SIMD lane the chunk views pad to.
pub const MAX_LANE_BYTES: usize = 64;

/// Marker trait for types that can be stored as components.
///
/// Components are plain copyable records: a row move between archetypes is a
/// copy, and padded chunk views may expose stale copies past the last row.
pub trait Component: Copy + Send + Sync + 'static {}

impl<T: Copy + Send + Sync + 'static> Component for T {}

/// Marker trait for zero-sized tag types.
///
/// Tags only take part in archetype signatures and query filters; they have
/// no column.
///
/// ```ignore
/// struct Frozen;
/// impl Tag for Frozen {}
/// ```
pub trait Tag: Send + Sync + 'static {}

macro_rules! type_index {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u16);

        impl $name {
            /// Create an index from a raw value.
            #[must_use]
            pub const fn from_raw(raw: u16) -> Self {
                Self(raw)
            }

            /// Get the raw index value.
            #[must_use]
            pub const fn as_raw(self) -> u16 {
                self.0
            }

            /// Create an index from a bit position.
            ///
            /// # Panics
            ///
            /// Panics if `index` does not fit a signature bitset.
            #[must_use]
            pub fn from_usize(index: usize) -> Self {
                assert!(index < MAX_TYPES, concat!($label, " index {} out of range"), index);
                Self(index as u16)
            }

            /// Bit position of this index.
            #[must_use]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

type_index!(
    /// Dense per-store index of a component type.
    ComponentIndex,
    "component"
);

type_index!(
    /// Dense per-store index of a tag type.
    TagIndex,
    "tag"
);

/// Runtime information about a component type.
#[derive(Clone)]
pub struct ComponentInfo {
    index: ComponentIndex,
    name: &'static str,
    size: usize,
    align: usize,
    /// Rows kept initialized past the last occupied row.
    pad_rows: usize,
    /// Smallest row count whose byte length is a multiple of `MAX_LANE_BYTES`.
    lane_rows: usize,
    type_id: TypeId,
    new_column: fn(usize) -> Box<dyn ErasedColumn>,
}

impl ComponentInfo {
    /// Create component info for a concrete type.
    #[must_use]
    pub fn of<T: Component>(index: ComponentIndex) -> Self {
        let size = size_of::<T>();
        Self {
            index,
            name: std::any::type_name::<T>(),
            size,
            align: align_of::<T>(),
            pad_rows: pad_rows_for(size),
            lane_rows: lane_rows_for(size),
            type_id: TypeId::of::<T>(),
            new_column: TypedColumn::<T>::boxed,
        }
    }

    /// Get the component index.
    #[must_use]
    pub const fn index(&self) -> ComponentIndex {
        self.index
    }

    /// Get the component type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Get the size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Get the alignment requirement.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Rows of initialized padding every column of this type keeps.
    #[must_use]
    pub const fn pad_rows(&self) -> usize {
        self.pad_rows
    }

    /// Row granularity at which a column can be split without two parts
    /// sharing a 64-byte lane.
    #[must_use]
    pub const fn lane_rows(&self) -> usize {
        self.lane_rows
    }

    /// Check if this info is for the given type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub(crate) fn new_column(&self) -> Box<dyn ErasedColumn> {
        (self.new_column)(self.pad_rows)
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("pad_rows", &self.pad_rows)
            .finish_non_exhaustive()
    }
}

fn pad_rows_for(size: usize) -> usize {
    if size == 0 {
        0
    } else {
        MAX_LANE_BYTES.div_ceil(size)
    }
}

fn lane_rows_for(size: usize) -> usize {
    if size == 0 {
        return 1;
    }
    let (mut a, mut b) = (size, MAX_LANE_BYTES);
    while b != 0 {
        (a, b) = (b, a % b);
    }
    MAX_LANE_BYTES / a
}

/// Runtime information about a tag type.
#[derive(Clone, Debug)]
pub struct TagInfo {
    index: TagIndex,
    name: &'static str,
}

impl TagInfo {
    /// Get the tag index.
    #[must_use]
    pub const fn index(&self) -> TagIndex {
        self.index
    }

    /// Get the tag type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Registry for component and tag types of one store.
///
/// Component and tag indices are separate spaces, each limited to
/// [`MAX_TYPES`] entries.
#[derive(Default)]
pub struct TypeRegistry {
    component_ids: HashMap<TypeId, ComponentIndex, FxBuildHasher>,
    components: Vec<ComponentInfo>,
    tag_ids: HashMap<TypeId, TagIndex, FxBuildHasher>,
    tags: Vec<TagInfo>,
}

impl TypeRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type and return its index.
    ///
    /// If the type is already registered, returns the existing index.
    pub fn register_component<T: Component>(&mut self) -> EcsResult<ComponentIndex> {
        if let Some(&index) = self.component_ids.get(&TypeId::of::<T>()) {
            return Ok(index);
        }
        if self.components.len() >= MAX_TYPES {
            return Err(EcsError::TypeLimitExceeded {
                kind: "component",
                limit: MAX_TYPES,
            });
        }

        let index = ComponentIndex::from_usize(self.components.len());
        self.components.push(ComponentInfo::of::<T>(index));
        self.component_ids.insert(TypeId::of::<T>(), index);
        tracing::trace!(component = std::any::type_name::<T>(), ?index, "registered component");
        Ok(index)
    }

    /// Register a tag type and return its index.
    pub fn register_tag<T: Tag>(&mut self) -> EcsResult<TagIndex> {
        const { assert!(size_of::<T>() == 0, "tags must be zero-sized") };

        if let Some(&index) = self.tag_ids.get(&TypeId::of::<T>()) {
            return Ok(index);
        }
        if self.tags.len() >= MAX_TYPES {
            return Err(EcsError::TypeLimitExceeded {
                kind: "tag",
                limit: MAX_TYPES,
            });
        }

        let index = TagIndex::from_usize(self.tags.len());
        self.tags.push(TagInfo {
            index,
            name: std::any::type_name::<T>(),
        });
        self.tag_ids.insert(TypeId::of::<T>(), index);
        tracing::trace!(tag = std::any::type_name::<T>(), ?index, "registered tag");
        Ok(index)
    }

    /// Get the index of a component type, if registered.
    #[must_use]
    pub fn component_index<T: Component>(&self) -> Option<ComponentIndex> {
        self.component_ids.get(&TypeId::of::<T>()).copied()
    }

    /// Get the index of a tag type, if registered.
    #[must_use]
    pub fn tag_index<T: Tag>(&self) -> Option<TagIndex> {
        self.tag_ids.get(&TypeId::of::<T>()).copied()
    }

    /// Get component info by index.
    #[must_use]
    pub fn component_info(&self, index: ComponentIndex) -> Option<&ComponentInfo> {
        self.components.get(index.as_usize())
    }

    /// Get tag info by index.
    #[must_use]
    pub fn tag_info(&self, index: TagIndex) -> Option<&TagInfo> {
        self.tags.get(index.as_usize())
    }

    /// Number of registered component types.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Number of registered tag types.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Iterate over all registered component infos.
    pub fn components(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.components.iter()
    }

    /// Iterate over all registered tag infos.
    pub fn tags(&self) -> impl Iterator<Item = &TagInfo> {
        self.tags.iter()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("components", &self.components)
            .field("tags", &self.tags)
            .finish()
    }
}

/// A statically known set of component types, implemented for tuples.
pub trait ComponentBundle {
    /// Register every member and return the combined signature.
    fn register(registry: &mut TypeRegistry) -> EcsResult<ComponentTypes>;
}

/// A statically known set of tag types, implemented for tuples.
pub trait TagBundle {
    /// Register every member and return the combined tag set.
    fn register(registry: &mut TypeRegistry) -> EcsResult<Tags>;
}

macro_rules! impl_bundles {
    ($($ty:ident),*) => {
        impl<$($ty: Component),*> ComponentBundle for ($($ty,)*) {
            #[allow(unused_mut, unused_variables)]
            fn register(registry: &mut TypeRegistry) -> EcsResult<ComponentTypes> {
                let mut types = ComponentTypes::EMPTY;
                $(types.insert(registry.register_component::<$ty>()?);)*
                Ok(types)
            }
        }

        impl<$($ty: Tag),*> TagBundle for ($($ty,)*) {
            #[allow(unused_mut, unused_variables)]
            fn register(registry: &mut TypeRegistry) -> EcsResult<Tags> {
                let mut tags = Tags::EMPTY;
                $(tags.insert(registry.register_tag::<$ty>()?);)*
                Ok(tags)
            }
        }
    };
}

impl_bundles!();
impl_bundles!(A);
impl_bundles!(A, B);
impl_bundles!(A, B, C);
impl_bundles!(A, B, C, D);
impl_bundles!(A, B, C, D, E);
impl_bundles!(A, B, C, D, E, F);
impl_bundles!(A, B, C, D, E, F, G);
impl_bundles!(A, B, C, D, E, F, G, H);
