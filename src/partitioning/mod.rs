//! Partitioning of the dataset into buckets.
//!
//! K-means provides the clustering; [`PartitionBuilder`] wraps it with the
//! small-input rules the index builder relies on.

mod kmeans;
mod partition_builder;

pub use kmeans::{KMeans, KMeansConfig, KMeansInit, KMeansResult};
pub use partition_builder::{Partition, PartitionBuilder};
