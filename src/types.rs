//! Core type definitions for the learned index.
//!
//! This module contains the fundamental type aliases and constants used throughout the library.

/// Index type for points in a dataset.
/// Can represent up to 4 billion points with u32.
pub type PointIndex = u32;

/// Identifier of a bucket (a partition cell produced by clustering).
pub type BucketId = u32;

/// Compound bucket key used by the two-level index: (top-level bucket, sub-bucket).
pub type CompoundBucket = (BucketId, BucketId);

/// A nearest neighbor result: (index, distance).
pub type NNResultPair = (PointIndex, f32);

/// Vector of nearest neighbor results.
pub type NNResultsVector = Vec<NNResultPair>;

/// Distance assigned to result slots that hold no genuine candidate, for
/// measures bounded well below it (cosine distance never exceeds 2).
///
/// Unfilled rows, edge-padded slots and the duplicates padding introduces all
/// carry the sentinel, so any merge ranks them after real candidates.
pub const SENTINEL_DISTANCE: f32 = 10_000.0;

/// Sentinel for unbounded measures (L2, squared L2), where any finite
/// distance is legitimate.
pub const UNBOUNDED_SENTINEL_DISTANCE: f32 = f32::INFINITY;

/// Alignment for SIMD operations (in bytes).
pub const SIMD_ALIGNMENT: usize = 64;

/// Round up to the nearest multiple of alignment.
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }
}
