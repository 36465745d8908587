//! Utility functions and types.

pub(crate) mod parallel;
pub(crate) mod random;

pub use parallel::{maybe_parallel_map, MIN_PARALLEL_SIZE};
pub use random::{derive_seed, RandomSampler};
