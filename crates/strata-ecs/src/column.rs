//! Column storage - type-erased columns for archetype tables.
//!
//! Each column stores components of a single type in a contiguous vector. The
//! vector is kept fully initialized and at least `pad_rows` longer than the
//! number of occupied rows, so padded chunk views never read past defined
//! memory.

use std::any::Any;

/// Operations an archetype performs on a column without knowing its type.
pub trait ErasedColumn: Send + Sync {
    /// Number of occupied rows.
    fn len(&self) -> usize;

    /// Check if the column has no occupied rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `row`, moving the last occupied row into its place.
    fn swap_remove(&mut self, row: usize);

    /// Append a copy of `row` to `dst`, which must hold the same type.
    fn copy_row_to(&self, row: usize, dst: &mut dyn ErasedColumn);

    /// Reserve backing storage for `additional` more rows.
    fn reserve(&mut self, additional: usize);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A column of components of a single type.
pub struct TypedColumn<T> {
    /// Backing storage; every element is initialized.
    data: Vec<T>,
    /// Occupied rows.
    len: usize,
    /// Minimum initialized rows past `len` once anything was pushed.
    pad_rows: usize,
}

impl<T: Copy + Send + Sync + 'static> TypedColumn<T> {
    /// Create an empty column.
    #[must_use]
    pub const fn new(pad_rows: usize) -> Self {
        Self {
            data: Vec::new(),
            len: 0,
            pad_rows,
        }
    }

    /// Create an empty boxed column, used as the column factory of a type.
    pub(crate) fn boxed(pad_rows: usize) -> Box<dyn ErasedColumn> {
        Box::new(Self::new(pad_rows))
    }

    /// Number of occupied rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the column is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rows of initialized padding kept past the last occupied row.
    #[must_use]
    pub const fn pad_rows(&self) -> usize {
        self.pad_rows
    }

    /// Append a row.
    pub fn push(&mut self, value: T) {
        let required = self.len + 1 + self.pad_rows;
        if required > self.data.len() {
            // Fill with copies of `value` so the tail is always initialized.
            let new_len = (self.data.len() * 2).max(required).max(4);
            self.data.resize(new_len, value);
        }
        self.data[self.len] = value;
        self.len += 1;
    }

    /// Get a row.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.as_slice().get(row)
    }

    /// Get a row mutably.
    #[must_use]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(row)
    }

    /// Occupied rows.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    /// Occupied rows, mutably.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }

    /// Occupied rows followed by the initialized padding.
    #[must_use]
    pub fn backing(&self) -> &[T] {
        &self.data
    }

    /// Occupied rows followed by the initialized padding, mutably.
    #[must_use]
    pub fn backing_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Copy + Send + Sync + 'static> ErasedColumn for TypedColumn<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn swap_remove(&mut self, row: usize) {
        assert!(row < self.len, "row {row} out of range for column of length {}", self.len);
        let last = self.len - 1;
        if row != last {
            self.data[row] = self.data[last];
        }
        self.len = last;
    }

    fn copy_row_to(&self, row: usize, dst: &mut dyn ErasedColumn) {
        let Some(dst) = dst.as_any_mut().downcast_mut::<Self>() else {
            panic!(
                "column type mismatch: cannot copy {} into another column type",
                std::any::type_name::<T>()
            );
        };
        dst.push(self.data[row]);
    }

    fn reserve(&mut self, additional: usize) {
        let required = self.len + additional + self.pad_rows;
        self.data.reserve(required.saturating_sub(self.data.len()));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[test]
    fn test_column_push_get() {
        let mut col = TypedColumn::<Position>::new(8);

        col.push(Position { x: 1.0, y: 2.0 });
        col.push(Position { x: 3.0, y: 4.0 });

        assert_eq!(col.len(), 2);
        assert_eq!(col.get(0), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(col.get(1), Some(&Position { x: 3.0, y: 4.0 }));
        assert_eq!(col.get(2), None);
    }

    #[test]
    fn test_column_keeps_padding_initialized() {
        let mut col = TypedColumn::<u32>::new(16);

        for i in 0..37 {
            col.push(i);
            assert!(col.backing().len() >= col.len() + 16);
        }
        assert_eq!(col.as_slice().len(), 37);
    }

    #[test]
    fn test_column_swap_remove() {
        let mut col = TypedColumn::<Position>::new(8);

        col.push(Position { x: 1.0, y: 2.0 });
        col.push(Position { x: 3.0, y: 4.0 });
        col.push(Position { x: 5.0, y: 6.0 });

        ErasedColumn::swap_remove(&mut col, 0);

        assert_eq!(col.len(), 2);
        // Element from index 2 is now at index 0
        assert_eq!(col.as_slice(), &[
            Position { x: 5.0, y: 6.0 },
            Position { x: 3.0, y: 4.0 }
        ]);

        ErasedColumn::swap_remove(&mut col, 1);
        assert_eq!(col.as_slice(), &[Position { x: 5.0, y: 6.0 }]);
    }

    #[test]
    fn test_copy_row_between_erased_columns() {
        let mut src: Box<dyn ErasedColumn> = TypedColumn::<u64>::boxed(8);
        let mut dst: Box<dyn ErasedColumn> = TypedColumn::<u64>::boxed(8);

        src.as_any_mut()
            .downcast_mut::<TypedColumn<u64>>()
            .unwrap()
            .push(42);
        src.copy_row_to(0, dst.as_mut());

        let dst = dst.as_any().downcast_ref::<TypedColumn<u64>>().unwrap();
        assert_eq!(dst.as_slice(), &[42]);
    }

    #[test]
    #[should_panic(expected = "column type mismatch")]
    fn test_copy_row_type_mismatch_panics() {
        let mut src = TypedColumn::<u64>::new(8);
        src.push(1);
        let mut dst = TypedColumn::<u32>::new(16);
        src.copy_row_to(0, &mut dst);
    }

    #[test]
    fn test_zero_sized_column() {
        #[derive(Clone, Copy)]
        struct Marker;

        let mut col = TypedColumn::<Marker>::new(0);
        col.push(Marker);
        col.push(Marker);
        ErasedColumn::swap_remove(&mut col, 0);
        assert_eq!(col.len(), 1);
    }
}
