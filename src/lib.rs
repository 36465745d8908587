//! # Learned Index - Classifier-Routed Nearest Neighbor Search
//!
//! A Rust implementation of a *learned index* for approximate nearest
//! neighbor search over dense embeddings.
//!
//! ## Overview
//!
//! Instead of a tree or graph, the index:
//!
//! - **Partitions** the dataset into buckets with seeded k-means
//! - **Trains a router** (MLP or linear softmax classifier) that ranks buckets
//!   for any query vector
//! - **Probes** the most probable buckets round by round, computing exact
//!   distances only inside the visited buckets
//! - **Merges** every round into a running per-query top-k, optionally pruning
//!   later rounds with the current worst distance as a threshold
//! - **Two levels**: every top-level bucket can carry its own sub-router
//!
//! ## Quick Start
//!
//! ```rust
//! use learned_index::prelude::*;
//!
//! let data: Vec<Vec<f32>> = (0..200)
//!     .map(|i| vec![(i % 10) as f32, (i / 10) as f32])
//!     .collect();
//! let dataset = DenseDataset::from_vecs(data).unwrap();
//!
//! let config = LearnedIndexConfig::new()
//!     .with_bucket_count(4)
//!     .with_epochs(5)
//!     .with_distance_measure(DistanceMeasure::SquaredL2);
//! let mut index = LearnedIndex::new(config);
//! index.build(&dataset).unwrap();
//!
//! let queries = DenseDataset::from_vecs(vec![vec![3.0, 4.0]]).unwrap();
//! let output = index
//!     .search(&dataset, &queries, &queries, &SearchConfig::new(5).with_n_buckets(2))
//!     .unwrap();
//!
//! for (id, distance) in output.rows.results(0) {
//!     println!("Index: {}, Distance: {:.4}", id, distance);
//! }
//! ```
//!
//! ## Distance Measures
//!
//! | Measure | Description |
//! |---------|-------------|
//! | `Cosine` | 1 - cosine similarity (default) |
//! | `L2` | Euclidean |
//! | `SquaredL2` | Squared Euclidean (fastest) |
//!
//! ## Module Overview
//!
//! - [`data_format`]: Dense, aligned dataset storage
//! - [`distance_measures`]: Pairwise and threshold-pruned distance kernels
//! - [`partitioning`]: K-means and bucket assignment
//! - [`routing`]: Bucket-ranking classifiers and their training
//! - [`search`]: Bucket probing and top-k merging
//! - [`utils`]: Seeded sampling and parallel helpers

#![allow(clippy::needless_range_loop)]
#![allow(clippy::module_inception)]

pub mod data_format;
pub mod distance_measures;
pub mod partitioning;
pub mod routing;
pub mod search;
pub mod utils;

mod config;
mod error;
mod index;
mod types;

pub use config::{LearnedIndexConfig, SearchConfig, DEFAULT_SEED};
pub use error::{ErrorCode, IndexError, Result};
pub use index::{BuildReport, LearnedIndex, LearnedIndexBuilder};
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{LearnedIndexConfig, SearchConfig};
    pub use crate::data_format::DenseDataset;
    pub use crate::distance_measures::{DistanceEngine, DistanceMeasure};
    pub use crate::error::{ErrorCode, IndexError, Result};
    pub use crate::index::{BuildReport, LearnedIndex, LearnedIndexBuilder};
    pub use crate::partitioning::{Partition, PartitionBuilder};
    pub use crate::routing::{BucketRanking, HierarchicalRouter, ModelKind, RoutingModel};
    pub use crate::search::{BucketProbeSearch, ResultRows, SearchOutput, SearchTimings};
    pub use crate::types::*;
}
