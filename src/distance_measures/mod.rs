//! Distance measures for exact search inside buckets.
//!
//! The probe loop only needs two operations from a distance backend: a full
//! query-by-member distance matrix, and a threshold-pruned variant that drops
//! members no query can use. Both are captured by [`DistanceEngine`];
//! [`DistanceMeasure`] is the built-in implementation.

pub mod many_to_many;

pub use many_to_many::*;

use crate::types::{SENTINEL_DISTANCE, UNBOUNDED_SENTINEL_DISTANCE};
use serde::{Deserialize, Serialize};

/// Enum representing the available distance measures.
///
/// All measures are non-negative with 0 meaning identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMeasure {
    /// Cosine distance: 1 - cosine_similarity.
    #[default]
    Cosine,

    /// L2 (Euclidean) distance.
    L2,

    /// Squared L2 distance: sum of squared differences (faster than L2).
    SquaredL2,
}

/// Distances kept by a threshold-pruned computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdedDistances {
    /// `distances[q][j]` is the distance from query `q` to member `kept[j]`.
    pub distances: Vec<Vec<f32>>,

    /// Positions (into the member slice) of the members that survived pruning,
    /// in their original order.
    pub kept: Vec<usize>,
}

/// Pairwise distance backend used by the probe loop.
pub trait DistanceEngine: Send + Sync {
    /// Full matrix: `result[q][m]` = distance(queries[q], members[m]).
    fn pairwise(&self, queries: &[&[f32]], members: &[&[f32]]) -> Vec<Vec<f32>>;

    /// Like [`pairwise`](Self::pairwise), but a member is dropped unless at
    /// least one query `q` sees it within `thresholds[q]` (inclusive).
    ///
    /// Returns `None` when no member survives.
    fn pairwise_threshold(
        &self,
        queries: &[&[f32]],
        members: &[&[f32]],
        thresholds: &[f32],
    ) -> Option<ThresholdedDistances>;

    /// Distance marking empty and padded result slots. Must exceed every
    /// distance this engine can produce.
    fn sentinel(&self) -> f32 {
        UNBOUNDED_SENTINEL_DISTANCE
    }

    /// True if `distance` marks an empty or padded slot.
    fn is_sentinel(&self, distance: f32) -> bool {
        distance >= self.sentinel()
    }
}

impl DistanceMeasure {
    /// Compute the distance between two dense vectors.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMeasure::Cosine => cosine_distance(a, b),
            DistanceMeasure::L2 => squared_l2_dense(a, b).sqrt(),
            DistanceMeasure::SquaredL2 => squared_l2_dense(a, b),
        }
    }

    /// Get the name of this distance measure.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMeasure::Cosine => "Cosine",
            DistanceMeasure::L2 => "L2",
            DistanceMeasure::SquaredL2 => "SquaredL2",
        }
    }
}

impl DistanceEngine for DistanceMeasure {
    fn pairwise(&self, queries: &[&[f32]], members: &[&[f32]]) -> Vec<Vec<f32>> {
        match self {
            DistanceMeasure::Cosine => pairwise_cosine(queries, members),
            DistanceMeasure::L2 => pairwise_l2(queries, members),
            DistanceMeasure::SquaredL2 => pairwise_squared_l2(queries, members),
        }
    }

    fn pairwise_threshold(
        &self,
        queries: &[&[f32]],
        members: &[&[f32]],
        thresholds: &[f32],
    ) -> Option<ThresholdedDistances> {
        pairwise_with_threshold(*self, queries, members, thresholds)
    }

    fn sentinel(&self) -> f32 {
        match self {
            DistanceMeasure::Cosine => SENTINEL_DISTANCE,
            DistanceMeasure::L2 | DistanceMeasure::SquaredL2 => UNBOUNDED_SENTINEL_DISTANCE,
        }
    }
}
