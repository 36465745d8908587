//! Bucket assignment by clustering.
//!
//! [`PartitionBuilder`] turns a point set into per-point bucket labels. It
//! absorbs degenerate inputs locally: fewer than two points yields an
//! all-zero labelling with no clustering state, never an error.

use crate::data_format::DenseDataset;
use crate::error::Result;
use crate::partitioning::kmeans::{KMeans, KMeansConfig, KMeansResult};
use crate::types::BucketId;
use tracing::debug;

/// Output of [`PartitionBuilder::cluster`].
#[derive(Debug, Clone)]
pub struct Partition {
    /// Clustering state, absent when the input was too small to cluster.
    pub state: Option<KMeansResult>,

    /// One label per input point, each in `0..num_buckets`.
    pub labels: Vec<BucketId>,

    /// Number of buckets labels may refer to (at least 1).
    pub num_buckets: usize,
}

impl Partition {
    /// True when clustering was skipped for a degenerate input.
    pub fn is_degenerate(&self) -> bool {
        self.state.is_none()
    }

    /// Member point positions for every bucket, in ascending position order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.num_buckets];
        for (i, &label) in self.labels.iter().enumerate() {
            members[label as usize].push(i);
        }
        members
    }
}

/// Clusters point sets into a target number of buckets.
#[derive(Debug, Clone)]
pub struct PartitionBuilder {
    seed: u64,
    max_iterations: usize,
}

impl PartitionBuilder {
    /// Create a builder with an explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_iterations: KMeansConfig::default().max_iterations,
        }
    }

    /// Set the k-means iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Seed used for clustering.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The cluster count actually requested for `n` points.
    ///
    /// When there are fewer points than requested clusters the target shrinks
    /// to `max(2, n / 5)`.
    pub fn effective_cluster_count(n: usize, target: usize) -> usize {
        if n < target {
            (n / 5).max(2)
        } else {
            target
        }
    }

    /// Cluster `points` into (at most) `target_cluster_count` buckets.
    pub fn cluster(&self, points: &DenseDataset, target_cluster_count: usize) -> Result<Partition> {
        let n = points.size();
        if n < 2 {
            debug!(points = n, "partition too small to cluster, assigning bucket 0");
            return Ok(Partition {
                state: None,
                labels: vec![0; n],
                num_buckets: 1,
            });
        }

        let clusters = Self::effective_cluster_count(n, target_cluster_count.max(1));
        let config = KMeansConfig::new(clusters)
            .with_seed(self.seed)
            .with_max_iterations(self.max_iterations);
        let result = KMeans::new(config).fit(points)?;

        debug!(
            points = n,
            clusters = result.num_clusters(),
            iterations = result.num_iterations,
            converged = result.converged,
            "clustered partition"
        );

        let labels = result
            .assignments
            .iter()
            .map(|&a| a as BucketId)
            .collect();
        Ok(Partition {
            num_buckets: result.num_clusters(),
            labels,
            state: Some(result),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_points(n: usize) -> DenseDataset {
        DenseDataset::from_vecs((0..n).map(|i| vec![i as f32, 1.0]).collect()).unwrap()
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let partition = PartitionBuilder::new(1).cluster(&line_points(1), 10).unwrap();
        assert!(partition.is_degenerate());
        assert_eq!(partition.labels, vec![0]);
        assert_eq!(partition.num_buckets, 1);
    }

    #[test]
    fn test_empty_is_degenerate() {
        let partition = PartitionBuilder::new(1)
            .cluster(&DenseDataset::new(), 10)
            .unwrap();
        assert!(partition.is_degenerate());
        assert!(partition.labels.is_empty());
    }

    #[test]
    fn test_effective_cluster_count() {
        assert_eq!(PartitionBuilder::effective_cluster_count(1000, 100), 100);
        assert_eq!(PartitionBuilder::effective_cluster_count(50, 100), 10);
        assert_eq!(PartitionBuilder::effective_cluster_count(7, 100), 2);
    }

    #[test]
    fn test_labels_in_range() {
        let partition = PartitionBuilder::new(3).cluster(&line_points(40), 100).unwrap();
        assert_eq!(partition.num_buckets, 8);
        assert_eq!(partition.labels.len(), 40);
        assert!(partition.labels.iter().all(|&l| (l as usize) < partition.num_buckets));
        let total: usize = partition.members().iter().map(|m| m.len()).sum();
        assert_eq!(total, 40);
    }

    #[test]
    fn test_same_seed_same_labels() {
        let points = line_points(60);
        let a = PartitionBuilder::new(2023).cluster(&points, 6).unwrap();
        let b = PartitionBuilder::new(2023).cluster(&points, 6).unwrap();
        assert_eq!(a.labels, b.labels);
    }
}
