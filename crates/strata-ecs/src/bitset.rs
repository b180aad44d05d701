//! Fixed-size bitsets used as archetype signatures and query predicates.
//!
//! [`ComponentTypes`] and [`Tags`] are thin typed wrappers over [`BitSet256`]
//! so a component index can never be tested against a tag set by accident.

use std::{fmt, ops::BitOr};

use crate::component::{ComponentIndex, TagIndex};

/// Maximum number of component types (and, separately, tag types) per store.
pub const MAX_TYPES: usize = 256;

const WORDS: usize = MAX_TYPES / 64;

/// A 256-bit set stored inline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitSet256([u64; WORDS]);

impl BitSet256 {
    /// The empty set.
    pub const EMPTY: Self = Self([0; WORDS]);

    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Set `bit`. Returns `true` if it was not set before.
    ///
    /// # Panics
    ///
    /// Panics if `bit >= MAX_TYPES`.
    pub fn insert(&mut self, bit: usize) -> bool {
        assert!(bit < MAX_TYPES, "bit {bit} out of range");
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        let was_clear = self.0[word] & mask == 0;
        self.0[word] |= mask;
        was_clear
    }

    /// Clear `bit`. Returns `true` if it was set before.
    pub fn remove(&mut self, bit: usize) -> bool {
        if bit >= MAX_TYPES {
            return false;
        }
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        let was_set = self.0[word] & mask != 0;
        self.0[word] &= !mask;
        was_set
    }

    /// Check whether `bit` is set.
    #[must_use]
    pub fn contains(&self, bit: usize) -> bool {
        bit < MAX_TYPES && self.0[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    /// Bits set in either operand.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] | other.0[i]))
    }

    /// Bits set in both operands.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] & other.0[i]))
    }

    /// Bits set in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] & !other.0[i]))
    }

    /// `self ⊇ other`. Always true for an empty `other`.
    #[must_use]
    pub fn has_all(&self, other: &Self) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & b == *b)
    }

    /// `self ∩ other ≠ ∅`. Always false for an empty `other`.
    #[must_use]
    pub fn has_any(&self, other: &Self) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Check whether no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&word| word == 0)
    }

    /// Number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterate over set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }
}

impl fmt::Debug for BitSet256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

macro_rules! typed_set {
    ($(#[$meta:meta])* $name:ident, $index:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(BitSet256);

        impl $name {
            /// The empty set.
            pub const EMPTY: Self = Self(BitSet256::EMPTY);

            /// Create an empty set.
            #[must_use]
            pub const fn new() -> Self {
                Self::EMPTY
            }

            /// Create a set holding a single index.
            #[must_use]
            pub fn single(index: $index) -> Self {
                let mut set = Self::EMPTY;
                set.insert(index);
                set
            }

            /// Add `index`. Returns `true` if it was not present.
            pub fn insert(&mut self, index: $index) -> bool {
                self.0.insert(index.as_usize())
            }

            /// Remove `index`. Returns `true` if it was present.
            pub fn remove(&mut self, index: $index) -> bool {
                self.0.remove(index.as_usize())
            }

            /// Check whether `index` is present.
            #[must_use]
            pub fn contains(&self, index: $index) -> bool {
                self.0.contains(index.as_usize())
            }

            /// Copy of `self` with `index` added.
            #[must_use]
            pub fn with(mut self, index: $index) -> Self {
                self.insert(index);
                self
            }

            /// Copy of `self` with `index` removed.
            #[must_use]
            pub fn without(mut self, index: $index) -> Self {
                self.remove(index);
                self
            }

            /// Indices present in either set.
            #[must_use]
            pub fn union(&self, other: &Self) -> Self {
                Self(self.0.union(&other.0))
            }

            /// Indices present in both sets.
            #[must_use]
            pub fn intersection(&self, other: &Self) -> Self {
                Self(self.0.intersection(&other.0))
            }

            /// Indices present in `self` but not in `other`.
            #[must_use]
            pub fn difference(&self, other: &Self) -> Self {
                Self(self.0.difference(&other.0))
            }

            /// `self ⊇ other`.
            #[must_use]
            pub fn has_all(&self, other: &Self) -> bool {
                self.0.has_all(&other.0)
            }

            /// `self ∩ other ≠ ∅`.
            #[must_use]
            pub fn has_any(&self, other: &Self) -> bool {
                self.0.has_any(&other.0)
            }

            /// Check whether the set is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Number of indices in the set.
            #[must_use]
            pub fn count(&self) -> usize {
                self.0.count()
            }

            /// Iterate over indices in ascending order.
            pub fn iter(&self) -> impl Iterator<Item = $index> + '_ {
                self.0.iter().map($index::from_usize)
            }

            /// The underlying bitset.
            #[must_use]
            pub const fn bits(&self) -> &BitSet256 {
                &self.0
            }
        }

        impl AsRef<BitSet256> for $name {
            fn as_ref(&self) -> &BitSet256 {
                &self.0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                self.union(&rhs)
            }
        }

        impl FromIterator<$index> for $name {
            fn from_iter<I: IntoIterator<Item = $index>>(iter: I) -> Self {
                let mut set = Self::EMPTY;
                for index in iter {
                    set.insert(index);
                }
                set
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{:?}", stringify!($name), self.0)
            }
        }
    };
}

typed_set!(
    /// The set of component types of an archetype or query.
    ComponentTypes,
    ComponentIndex
);

typed_set!(
    /// The set of tags of an archetype or query.
    Tags,
    TagIndex
);

#[cfg(test)]
mod tests {
    use super::*;

    fn set(bits: &[usize]) -> BitSet256 {
        let mut set = BitSet256::new();
        for &bit in bits {
            set.insert(bit);
        }
        set
    }

    #[test]
    fn test_insert_remove_contains() {
        let mut bits = BitSet256::new();
        assert!(bits.insert(3));
        assert!(!bits.insert(3));
        assert!(bits.insert(200));
        assert!(bits.contains(3));
        assert!(bits.contains(200));
        assert!(!bits.contains(4));
        assert_eq!(bits.count(), 2);

        assert!(bits.remove(3));
        assert!(!bits.remove(3));
        assert!(!bits.contains(3));
        assert!(!bits.remove(999));
    }

    #[test]
    fn test_set_algebra() {
        let a = set(&[1, 64, 130]);
        let b = set(&[64, 255]);

        assert_eq!(a.union(&b), set(&[1, 64, 130, 255]));
        assert_eq!(a.intersection(&b), set(&[64]));
        assert_eq!(a.difference(&b), set(&[1, 130]));
    }

    #[test]
    fn test_has_all_has_any_with_empty_operand() {
        let a = set(&[5, 70]);
        let empty = BitSet256::EMPTY;

        assert!(a.has_all(&empty));
        assert!(!a.has_any(&empty));
        assert!(a.has_all(&set(&[70])));
        assert!(!a.has_all(&set(&[70, 71])));
        assert!(a.has_any(&set(&[70, 71])));
    }

    #[test]
    fn test_iter_in_order() {
        let bits = set(&[255, 0, 63, 64, 128]);
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![0, 63, 64, 128, 255]);
    }

    #[test]
    fn test_typed_sets_equality_and_hash_key() {
        use std::collections::HashSet;

        let a = Tags::single(TagIndex::from_usize(2)).with(TagIndex::from_usize(9));
        let b: Tags = [TagIndex::from_usize(9), TagIndex::from_usize(2)]
            .into_iter()
            .collect();
        assert_eq!(a, b);

        let mut keys = HashSet::new();
        keys.insert(a);
        assert!(keys.contains(&b));
        assert_eq!(b.without(TagIndex::from_usize(2)).count(), 1);
    }
}
