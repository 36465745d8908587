//! Configuration types for the learned index.
//!
//! Build options (clustering, classifier training, hierarchy depth) and
//! search options (probe depth, result width, threshold pruning) are kept
//! apart, since one built index serves many searches.

use serde::{Deserialize, Serialize};
use crate::distance_measures::DistanceMeasure;
use crate::error::{IndexError, Result};
use crate::routing::ModelKind;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 2023;

/// Main configuration for building a learned index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedIndexConfig {
    /// Number of buckets to cluster into (per level).
    pub bucket_count: usize,

    /// Training epochs for every routing model.
    pub epochs: usize,

    /// SGD learning rate.
    pub learning_rate: f32,

    /// Classifier architecture.
    pub model_kind: ModelKind,

    /// Hierarchy depth: 1 = flat, 2 = top-level buckets with sub-routers.
    pub levels: usize,

    /// Mini-batch size used during training.
    pub batch_size: usize,

    /// Hidden layer width for [`ModelKind::Mlp`].
    pub hidden_dim: usize,

    /// Seed for clustering, weight initialization and batch shuffling.
    pub seed: u64,

    /// Distance measure used for the exact search inside buckets.
    pub distance_measure: DistanceMeasure,

    /// Maximum Lloyd iterations for k-means.
    pub kmeans_max_iterations: usize,
}

impl Default for LearnedIndexConfig {
    fn default() -> Self {
        Self {
            bucket_count: 100,
            epochs: 100,
            learning_rate: 0.1,
            model_kind: ModelKind::Mlp,
            levels: 1,
            batch_size: 256,
            hidden_dim: 128,
            seed: DEFAULT_SEED,
            distance_measure: DistanceMeasure::Cosine,
            kmeans_max_iterations: 25,
        }
    }
}

impl LearnedIndexConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the number of buckets.
    pub fn with_bucket_count(mut self, n: usize) -> Self {
        self.bucket_count = n;
        self
    }

    /// Set the number of training epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the learning rate.
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the classifier architecture.
    pub fn with_model_kind(mut self, kind: ModelKind) -> Self {
        self.model_kind = kind;
        self
    }

    /// Set the hierarchy depth.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    /// Set the training batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the hidden layer width.
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the distance measure.
    pub fn with_distance_measure(mut self, measure: DistanceMeasure) -> Self {
        self.distance_measure = measure;
        self
    }

    /// Set the k-means iteration cap.
    pub fn with_kmeans_max_iterations(mut self, iterations: usize) -> Self {
        self.kmeans_max_iterations = iterations;
        self
    }

    /// Check if this builds a two-level hierarchy.
    pub fn is_hierarchical(&self) -> bool {
        self.levels == 2
    }

    /// Reject configurations the builder cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_count == 0 {
            return Err(IndexError::invalid_argument("bucket_count must be > 0"));
        }
        if !(1..=2).contains(&self.levels) {
            return Err(IndexError::invalid_argument(format!(
                "levels must be 1 or 2, got {}",
                self.levels
            )));
        }
        if self.batch_size == 0 {
            return Err(IndexError::invalid_argument("batch_size must be > 0"));
        }
        if self.model_kind == ModelKind::Mlp && self.hidden_dim == 0 {
            return Err(IndexError::invalid_argument("hidden_dim must be > 0 for MLP"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(IndexError::invalid_argument("learning_rate must be positive"));
        }
        Ok(())
    }
}

/// Per-call search options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of probe rounds (most probable buckets visited per query).
    pub n_buckets: usize,

    /// Number of neighbors returned per query.
    pub k: usize,

    /// Bound later rounds by the worst distance in the running top-k.
    pub use_threshold: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_buckets: 1,
            k: 10,
            use_threshold: false,
        }
    }
}

impl SearchConfig {
    /// Create search options returning `k` neighbors from the top bucket.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Set the probe depth.
    pub fn with_n_buckets(mut self, n_buckets: usize) -> Self {
        self.n_buckets = n_buckets;
        self
    }

    /// Enable or disable threshold pruning.
    pub fn with_threshold(mut self, use_threshold: bool) -> Self {
        self.use_threshold = use_threshold;
        self
    }

    /// Reject zero-width or zero-depth searches.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(IndexError::invalid_argument("k must be >= 1"));
        }
        if self.n_buckets == 0 {
            return Err(IndexError::invalid_argument("n_buckets must be >= 1"));
        }
        Ok(())
    }
}
