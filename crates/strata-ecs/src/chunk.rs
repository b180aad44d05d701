//! Typed, length-bounded views over one column of one archetype.
//!
//! A chunk borrows the column's backing storage, which extends past the last
//! occupied row with initialized padding. The padded byte views round the
//! chunk's byte length up to a SIMD lane width, so a vectorized loop can
//! process the trailing partial lane without a scalar remainder.
//!
//! ```ignore
//! let chunk = archetype.chunk::<f32>(store.registry())?;
//! for lane in chunk.padded_bytes32().chunks_exact(32) {
//!     // 8 x f32 per lane
//! }
//! ```

use std::{
    fmt,
    ops::{Deref, Index, IndexMut},
};

use bytemuck::Pod;

use crate::{
    entity::EntityId,
    error::{EcsError, EcsResult},
};

/// SIMD lane width in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaneWidth {
    /// 128-bit lanes.
    W16 = 16,
    /// 256-bit lanes.
    W32 = 32,
    /// 512-bit lanes.
    W64 = 64,
}

impl LaneWidth {
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// Byte length of `len` rows of `T` rounded up to a multiple of `width`.
#[must_use]
pub const fn padded_len<T>(len: usize, width: LaneWidth) -> usize {
    let mask = width.bytes() - 1;
    (len * size_of::<T>() + mask) & !mask
}

fn padded_slice<T: Pod>(backing: &[T], len: usize, width: LaneWidth) -> &[u8] {
    if size_of::<T>() == 0 {
        return &[];
    }
    let bytes: &[u8] = bytemuck::cast_slice(backing);
    &bytes[..padded_len::<T>(len, width)]
}

fn padded_slice_mut<T: Pod>(backing: &mut [T], len: usize, width: LaneWidth) -> &mut [u8] {
    if size_of::<T>() == 0 {
        return &mut [];
    }
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(backing);
    &mut bytes[..padded_len::<T>(len, width)]
}

/// Read-only view over the rows of one column.
#[derive(Clone, Copy)]
pub struct Chunk<'a, T> {
    backing: &'a [T],
    len: usize,
}

impl<'a, T> Chunk<'a, T> {
    pub(crate) fn new(backing: &'a [T], len: usize) -> Self {
        debug_assert!(len <= backing.len());
        Self { backing, len }
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the chunk has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The rows of the chunk.
    #[must_use]
    pub fn as_slice(&self) -> &'a [T] {
        &self.backing[..self.len]
    }

    /// Get a row, failing with [`EcsError::ChunkIndexOutOfRange`].
    pub fn get(&self, index: usize) -> EcsResult<&'a T> {
        self.as_slice()
            .get(index)
            .ok_or(EcsError::ChunkIndexOutOfRange {
                index,
                len: self.len,
            })
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> std::slice::Iter<'a, T> {
        self.as_slice().iter()
    }
}

impl<'a, T: Pod> Chunk<'a, T> {
    /// The rows as bytes, padded up to a multiple of `width`.
    #[must_use]
    pub fn padded_bytes(&self, width: LaneWidth) -> &'a [u8] {
        padded_slice(self.backing, self.len, width)
    }

    /// The rows as bytes, padded to 16-byte lanes.
    #[must_use]
    pub fn padded_bytes16(&self) -> &'a [u8] {
        self.padded_bytes(LaneWidth::W16)
    }

    /// The rows as bytes, padded to 32-byte lanes.
    #[must_use]
    pub fn padded_bytes32(&self) -> &'a [u8] {
        self.padded_bytes(LaneWidth::W32)
    }

    /// The rows as bytes, padded to 64-byte lanes.
    #[must_use]
    pub fn padded_bytes64(&self) -> &'a [u8] {
        self.padded_bytes(LaneWidth::W64)
    }
}

impl<T> Index<usize> for Chunk<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.len,
            "chunk index {index} out of range for length {}",
            self.len
        );
        &self.backing[index]
    }
}

impl<'a, T> IntoIterator for Chunk<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Chunk<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Mutable view over the rows of one column.
///
/// Writes through the padded byte view may touch the padding rows; those
/// never hold live data.
pub struct ChunkMut<'a, T> {
    backing: &'a mut [T],
    len: usize,
}

impl<'a, T> ChunkMut<'a, T> {
    pub(crate) fn new(backing: &'a mut [T], len: usize) -> Self {
        debug_assert!(len <= backing.len());
        Self { backing, len }
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the chunk has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The rows of the chunk.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.backing[..self.len]
    }

    /// The rows of the chunk, mutably.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.backing[..self.len]
    }

    /// Consume the view, keeping the mutable borrow of the rows.
    #[must_use]
    pub fn into_mut_slice(self) -> &'a mut [T] {
        self.backing.split_at_mut(self.len).0
    }

    /// Get a row, failing with [`EcsError::ChunkIndexOutOfRange`].
    pub fn get(&self, index: usize) -> EcsResult<&T> {
        let len = self.len;
        self.as_slice()
            .get(index)
            .ok_or(EcsError::ChunkIndexOutOfRange { index, len })
    }

    /// Get a row mutably, failing with [`EcsError::ChunkIndexOutOfRange`].
    pub fn get_mut(&mut self, index: usize) -> EcsResult<&mut T> {
        let len = self.len;
        self.as_mut_slice()
            .get_mut(index)
            .ok_or(EcsError::ChunkIndexOutOfRange { index, len })
    }

    /// Iterate over the rows mutably.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    /// Reborrow as a read-only chunk.
    #[must_use]
    pub fn as_chunk(&self) -> Chunk<'_, T> {
        Chunk::new(&*self.backing, self.len)
    }
}

impl<T: Pod> ChunkMut<'_, T> {
    /// The rows as bytes, padded up to a multiple of `width`.
    #[must_use]
    pub fn padded_bytes(&self, width: LaneWidth) -> &[u8] {
        padded_slice(&*self.backing, self.len, width)
    }

    /// The rows as mutable bytes, padded up to a multiple of `width`.
    #[must_use]
    pub fn padded_bytes_mut(&mut self, width: LaneWidth) -> &mut [u8] {
        padded_slice_mut(&mut *self.backing, self.len, width)
    }

    /// The rows as bytes, padded to 16-byte lanes.
    #[must_use]
    pub fn padded_bytes16(&self) -> &[u8] {
        self.padded_bytes(LaneWidth::W16)
    }

    /// The rows as bytes, padded to 32-byte lanes.
    #[must_use]
    pub fn padded_bytes32(&self) -> &[u8] {
        self.padded_bytes(LaneWidth::W32)
    }

    /// The rows as bytes, padded to 64-byte lanes.
    #[must_use]
    pub fn padded_bytes64(&self) -> &[u8] {
        self.padded_bytes(LaneWidth::W64)
    }
}

impl<T> Index<usize> for ChunkMut<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.len,
            "chunk index {index} out of range for length {}",
            self.len
        );
        &self.backing[index]
    }
}

impl<T> IndexMut<usize> for ChunkMut<'_, T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(
            index < self.len,
            "chunk index {index} out of range for length {}",
            self.len
        );
        &mut self.backing[index]
    }
}

impl<T: fmt::Debug> fmt::Debug for ChunkMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// The entity ids of the rows of a chunk, in row order.
#[derive(Clone, Copy, Debug)]
pub struct ChunkEntities<'a> {
    ids: &'a [EntityId],
}

impl<'a> ChunkEntities<'a> {
    pub(crate) const fn new(ids: &'a [EntityId]) -> Self {
        Self { ids }
    }

    /// Entity at `row`, failing with [`EcsError::ChunkIndexOutOfRange`].
    pub fn get(&self, row: usize) -> EcsResult<EntityId> {
        self.ids
            .get(row)
            .copied()
            .ok_or(EcsError::ChunkIndexOutOfRange {
                index: row,
                len: self.ids.len(),
            })
    }
}

impl Deref for ChunkEntities<'_> {
    type Target = [EntityId];

    fn deref(&self) -> &[EntityId] {
        self.ids
    }
}

impl<'a> IntoIterator for ChunkEntities<'a> {
    type Item = &'a EntityId;
    type IntoIter = std::slice::Iter<'a, EntityId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::TypedColumn;

    fn column_of(len: u32) -> TypedColumn<[f32; 3]> {
        let mut col = TypedColumn::new(64usize.div_ceil(12));
        for i in 0..len {
            col.push([i as f32; 3]);
        }
        col
    }

    #[test]
    fn test_padded_lengths() {
        // 5 rows of 12 bytes = 60 bytes
        let col = column_of(5);
        let chunk = Chunk::new(col.backing(), col.len());

        assert_eq!(chunk.padded_bytes16().len(), 64);
        assert_eq!(chunk.padded_bytes32().len(), 64);
        assert_eq!(chunk.padded_bytes64().len(), 64);

        // 6 rows = 72 bytes
        let col = column_of(6);
        let chunk = Chunk::new(col.backing(), col.len());
        assert_eq!(chunk.padded_bytes16().len(), 80);
        assert_eq!(chunk.padded_bytes32().len(), 96);
        assert_eq!(chunk.padded_bytes64().len(), 128);
    }

    #[test]
    fn test_padded_bytes_start_with_rows() {
        let col = column_of(3);
        let chunk = Chunk::new(col.backing(), col.len());
        let bytes = chunk.padded_bytes16();

        let first: &[u8] = bytemuck::bytes_of(&[0.0f32; 3]);
        assert_eq!(&bytes[..12], first);
        let third: &[u8] = bytemuck::bytes_of(&[2.0f32; 3]);
        assert_eq!(&bytes[24..36], third);
    }

    #[test]
    fn test_empty_chunk() {
        let col = TypedColumn::<u32>::new(16);
        let chunk = Chunk::new(col.backing(), col.len());

        assert!(chunk.is_empty());
        assert!(chunk.padded_bytes64().is_empty());
        assert!(matches!(
            chunk.get(0),
            Err(EcsError::ChunkIndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_get_out_of_range() {
        let col = column_of(2);
        let chunk = Chunk::new(col.backing(), col.len());

        assert_eq!(chunk.get(1).unwrap(), &[1.0; 3]);
        assert!(matches!(
            chunk.get(2),
            Err(EcsError::ChunkIndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    #[should_panic(expected = "chunk index 2 out of range")]
    fn test_index_out_of_range_panics() {
        let col = column_of(2);
        let chunk = Chunk::new(col.backing(), col.len());
        let _ = chunk[2];
    }

    #[test]
    fn test_chunk_mut_writes_through() {
        let mut col = column_of(4);
        let len = col.len();
        {
            let mut chunk = ChunkMut::new(col.backing_mut(), len);
            chunk[1] = [9.0; 3];
            *chunk.get_mut(3).unwrap() = [7.0; 3];
            assert!(chunk.get_mut(4).is_err());

            let bytes = chunk.padded_bytes_mut(LaneWidth::W32);
            assert_eq!(bytes.len(), 64);
        }
        assert_eq!(col.as_slice()[1], [9.0; 3]);
        assert_eq!(col.as_slice()[3], [7.0; 3]);
    }

    #[test]
    fn test_chunk_entities() {
        let ids = [EntityId::from_raw(3), EntityId::from_raw(8)];
        let entities = ChunkEntities::new(&ids);

        assert_eq!(entities.len(), 2);
        assert_eq!(entities.get(1).unwrap(), EntityId::from_raw(8));
        assert!(entities.get(2).is_err());
    }
}
