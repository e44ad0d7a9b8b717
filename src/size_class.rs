//! Size class selection
//!
//! Determines which segregated free list a block of a given size belongs to.

use crate::config::{CLASS_BOUNDS, NUM_SIZE_CLASSES};

/// Find the size class for a given block size
///
/// Returns the smallest class whose upper bound is at least `size`.
///
/// # Arguments
/// * `size` - Total block size in bytes, including header/footer overhead
pub fn class_of(size: usize) -> usize {
    // Linear search through the bounds. The table is small and
    // cache-friendly, and this is easier to reason about than a computed
    // mapping over its uneven spacing.
    for (index, &bound) in CLASS_BOUNDS.iter().enumerate() {
        if bound >= size {
            return index;
        }
    }

    // Unreachable: the final bound is usize::MAX.
    NUM_SIZE_CLASSES - 1
}
