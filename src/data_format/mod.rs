//! Data format types.
//!
//! Points, queries and per-bucket subsets are all stored as [`DenseDataset`].

mod dataset;

pub use dataset::DenseDataset;
