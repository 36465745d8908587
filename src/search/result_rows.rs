//! Per-query bounded top-k buffers.
//!
//! [`ResultRows`] holds exactly `k` (neighbor, distance) slots for every
//! query. Slots without a genuine candidate carry the distance engine's
//! sentinel, which exceeds every real distance.
//! Merging another set of rows keeps, per query, the `k` smallest distances
//! of the concatenation `self ++ other` under a stable sort, so on ties the
//! existing entries win over incoming ones and earlier columns win over later
//! ones.

use crate::error::{IndexError, Result};
use crate::types::{NNResultsVector, PointIndex};
use ordered_float::OrderedFloat;

/// Row-major `num_queries x k` distances and neighbor ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRows {
    k: usize,
    distances: Vec<f32>,
    neighbors: Vec<PointIndex>,
}

impl ResultRows {
    /// Rows with every slot empty: distance `sentinel`, neighbor 0.
    pub fn empty(num_queries: usize, k: usize, sentinel: f32) -> Self {
        Self {
            k,
            distances: vec![sentinel; num_queries * k],
            neighbors: vec![0; num_queries * k],
        }
    }

    /// Build rows from nested vectors. Every row must have length `k`.
    pub fn from_rows(distances: &[Vec<f32>], neighbors: &[Vec<PointIndex>], k: usize) -> Option<Self> {
        if distances.len() != neighbors.len()
            || distances.iter().any(|r| r.len() != k)
            || neighbors.iter().any(|r| r.len() != k)
        {
            return None;
        }
        Some(Self {
            k,
            distances: distances.concat(),
            neighbors: neighbors.concat(),
        })
    }

    /// Result width.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of query rows.
    pub fn num_queries(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.distances.len() / self.k
        }
    }

    /// Distances of query `q`, ascending once the row has been merged or filled.
    pub fn distances(&self, q: usize) -> &[f32] {
        &self.distances[q * self.k..(q + 1) * self.k]
    }

    /// Neighbor ids of query `q`.
    pub fn neighbors(&self, q: usize) -> &[PointIndex] {
        &self.neighbors[q * self.k..(q + 1) * self.k]
    }

    /// (neighbor, distance) pairs of query `q`.
    pub fn results(&self, q: usize) -> NNResultsVector {
        self.neighbors(q)
            .iter()
            .copied()
            .zip(self.distances(q).iter().copied())
            .collect()
    }

    /// Overwrite row `q`. Both slices must have length `k`.
    pub fn set_row(&mut self, q: usize, neighbors: &[PointIndex], distances: &[f32]) {
        debug_assert_eq!(neighbors.len(), self.k);
        debug_assert_eq!(distances.len(), self.k);
        let range = q * self.k..(q + 1) * self.k;
        self.neighbors[range.clone()].copy_from_slice(neighbors);
        self.distances[range].copy_from_slice(distances);
    }

    /// Worst (largest) kept distance per query.
    pub fn worst_distances(&self) -> Vec<f32> {
        self.distances
            .chunks(self.k.max(1))
            .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .collect()
    }

    /// Keep, per query, the `k` smallest of `self ++ other` (stable on ties).
    pub fn merge(&mut self, other: &ResultRows) -> Result<()> {
        if self.k != other.k {
            return Err(IndexError::invalid_argument(format!(
                "cannot merge rows of width {} into width {}",
                other.k, self.k
            )));
        }
        if self.num_queries() != other.num_queries() {
            return Err(IndexError::invalid_argument(format!(
                "cannot merge {} query rows into {}",
                other.num_queries(),
                self.num_queries()
            )));
        }

        let k = self.k;
        let mut scratch: Vec<(f32, PointIndex)> = Vec::with_capacity(2 * k);
        for q in 0..self.num_queries() {
            scratch.clear();
            scratch.extend(
                self.distances(q)
                    .iter()
                    .copied()
                    .zip(self.neighbors(q).iter().copied()),
            );
            scratch.extend(
                other
                    .distances(q)
                    .iter()
                    .copied()
                    .zip(other.neighbors(q).iter().copied()),
            );
            scratch.sort_by_key(|&(d, _)| OrderedFloat(d));

            let base = q * k;
            for (slot, &(d, id)) in scratch.iter().take(k).enumerate() {
                self.distances[base + slot] = d;
                self.neighbors[base + slot] = id;
            }
        }
        Ok(())
    }

    /// Split into nested `(distances, neighbors)` vectors, one per query.
    pub fn into_nested(self) -> (Vec<Vec<f32>>, Vec<Vec<PointIndex>>) {
        let k = self.k.max(1);
        (
            self.distances.chunks(k).map(|c| c.to_vec()).collect(),
            self.neighbors.chunks(k).map(|c| c.to_vec()).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SENTINEL_DISTANCE, UNBOUNDED_SENTINEL_DISTANCE};

    #[test]
    fn test_empty_rows_are_sentinel() {
        let rows = ResultRows::empty(3, 4, SENTINEL_DISTANCE);
        assert_eq!(rows.num_queries(), 3);
        assert!(rows.distances(2).iter().all(|&d| d == SENTINEL_DISTANCE));
        assert_eq!(rows.worst_distances(), vec![SENTINEL_DISTANCE; 3]);
    }

    #[test]
    fn test_far_real_candidate_beats_unbounded_sentinel() {
        let mut running =
            ResultRows::from_rows(&[vec![0.0, UNBOUNDED_SENTINEL_DISTANCE]], &[vec![0, 0]], 2).unwrap();
        let round = ResultRows::from_rows(&[vec![40_000.0, 40_401.0]], &[vec![1, 2]], 2).unwrap();
        running.merge(&round).unwrap();

        assert_eq!(running.neighbors(0), &[0, 1]);
        assert_eq!(running.distances(0), &[0.0, 40_000.0]);
    }

    #[test]
    fn test_merge_rejects_shape_mismatch() {
        let mut running = ResultRows::empty(2, 3, SENTINEL_DISTANCE);
        assert!(running.merge(&ResultRows::empty(2, 4, SENTINEL_DISTANCE)).is_err());
        assert!(running.merge(&ResultRows::empty(1, 3, SENTINEL_DISTANCE)).is_err());
        assert_eq!(running, ResultRows::empty(2, 3, SENTINEL_DISTANCE));
    }

    #[test]
    fn test_merge_two_rounds() {
        let mut running = ResultRows::from_rows(&[vec![0.1, 0.2]], &[vec![10, 11]], 2).unwrap();
        let round = ResultRows::from_rows(&[vec![0.05, 0.3]], &[vec![20, 21]], 2).unwrap();
        running.merge(&round).unwrap();

        assert_eq!(running.distances(0), &[0.05, 0.1]);
        assert_eq!(running.neighbors(0), &[20, 10]);
    }

    #[test]
    fn test_merge_ties_prefer_running_row() {
        let mut running = ResultRows::from_rows(&[vec![0.1, 0.4]], &[vec![1, 2]], 2).unwrap();
        let round = ResultRows::from_rows(&[vec![0.1, 0.4]], &[vec![3, 4]], 2).unwrap();
        running.merge(&round).unwrap();

        assert_eq!(running.neighbors(0), &[1, 3]);
        assert_eq!(running.distances(0), &[0.1, 0.1]);
    }

    #[test]
    fn test_merge_rows_independent() {
        let mut running = ResultRows::from_rows(
            &[vec![0.5, SENTINEL_DISTANCE], vec![0.1, 0.2]],
            &[vec![1, 1], vec![2, 3]],
            2,
        )
        .unwrap();
        let round = ResultRows::from_rows(
            &[vec![0.3, 0.9], vec![SENTINEL_DISTANCE, SENTINEL_DISTANCE]],
            &[vec![7, 8], vec![0, 0]],
            2,
        )
        .unwrap();
        running.merge(&round).unwrap();

        assert_eq!(running.results(0), vec![(7, 0.3), (1, 0.5)]);
        assert_eq!(running.results(1), vec![(2, 0.1), (3, 0.2)]);
    }

    #[test]
    fn test_from_rows_rejects_bad_width() {
        assert!(ResultRows::from_rows(&[vec![0.1]], &[vec![1]], 2).is_none());
    }

    #[test]
    fn test_into_nested() {
        let rows = ResultRows::from_rows(&[vec![0.1, 0.2], vec![0.3, 0.4]], &[vec![1, 2], vec![3, 4]], 2)
            .unwrap();
        let (d, n) = rows.into_nested();
        assert_eq!(d, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert_eq!(n, vec![vec![1, 2], vec![3, 4]]);
    }
}
