//! Splitting a row range into disjoint per-thread partitions.

use std::ops::Range;

/// Split `0..len` into exactly `parts` contiguous, disjoint ranges.
///
/// Every non-empty range except the last has a length that is a multiple of
/// `align`, so fixed-width lanes never straddle two partitions. Trailing
/// ranges may be empty when `len` is small.
///
/// # Panics
///
/// Panics if `parts` is zero.
#[must_use]
pub fn partition(len: usize, parts: usize, align: usize) -> Vec<Range<usize>> {
    assert!(parts > 0, "cannot partition into zero parts");

    let align = align.max(1);
    let per_part = len.div_ceil(parts).next_multiple_of(align);

    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for _ in 0..parts {
        let end = (start + per_part).min(len);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_range_exactly() {
        let ranges = partition(1000, 4, 1);
        assert_eq!(ranges, vec![0..250, 250..500, 500..750, 750..1000]);
    }

    #[test]
    fn test_partition_uneven_length() {
        let ranges = partition(10, 4, 1);
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn test_partition_respects_alignment() {
        let ranges = partition(100, 3, 16);
        assert_eq!(ranges, vec![0..48, 48..96, 96..100]);
        for range in &ranges[..2] {
            assert_eq!(range.len() % 16, 0);
        }
    }

    #[test]
    fn test_partition_small_input_leaves_empty_tail() {
        let ranges = partition(2, 4, 1);
        assert_eq!(ranges, vec![0..1, 1..2, 2..2, 2..2]);

        let ranges = partition(0, 3, 8);
        assert!(ranges.iter().all(Range::is_empty));
        assert_eq!(ranges.len(), 3);
    }
}
