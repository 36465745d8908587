//! K-means clustering implementation.
//!
//! Lloyd iterations with k-means++ seeding. The generator is always seeded
//! from the configuration, so the same input yields the same labels.

use crate::data_format::DenseDataset;
use crate::distance_measures::squared_l2_dense;
use crate::error::{IndexError, Result};
use crate::utils::parallel::maybe_parallel_map_threshold;
use crate::utils::RandomSampler;

/// Use parallel assignment only for larger datasets.
const KMEANS_PARALLEL_THRESHOLD: usize = 512;

/// Configuration for K-means clustering.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters.
    pub num_clusters: usize,

    /// Maximum number of iterations.
    pub max_iterations: usize,

    /// Convergence threshold (relative change in total distance).
    pub convergence_threshold: f64,

    /// Initialization method.
    pub init_method: KMeansInit,

    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            num_clusters: 10,
            max_iterations: 25,
            convergence_threshold: 1e-5,
            init_method: KMeansInit::KMeansPlusPlus,
            seed: crate::config::DEFAULT_SEED,
        }
    }
}

impl KMeansConfig {
    /// Create a new configuration with the given number of clusters.
    pub fn new(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// Set the initialization method.
    pub fn with_init_method(mut self, method: KMeansInit) -> Self {
        self.init_method = method;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Initialization method for K-means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KMeansInit {
    /// Random initialization from data points.
    Random,

    /// K-means++ initialization (better spread).
    KMeansPlusPlus,
}

/// K-means clustering result.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster centers.
    pub centers: Vec<Vec<f32>>,

    /// Cluster assignments for each point (nearest center).
    pub assignments: Vec<usize>,

    /// Number of points in each cluster.
    pub cluster_sizes: Vec<usize>,

    /// Total within-cluster sum of squares.
    pub inertia: f64,

    /// Number of iterations performed.
    pub num_iterations: usize,

    /// Whether the algorithm converged.
    pub converged: bool,
}

impl KMeansResult {
    /// Number of clusters (including any that ended up empty).
    pub fn num_clusters(&self) -> usize {
        self.centers.len()
    }
}

/// K-means clustering algorithm.
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    /// Create a new K-means instance with the given configuration.
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    /// Fit K-means to the given dataset.
    pub fn fit(&self, dataset: &DenseDataset) -> Result<KMeansResult> {
        if dataset.is_empty() {
            return Err(IndexError::invalid_argument("Cannot cluster empty dataset"));
        }

        let n = dataset.size();
        let k = self.config.num_clusters.min(n);

        if k == 0 {
            return Err(IndexError::invalid_argument("Number of clusters must be > 0"));
        }

        let data: Vec<&[f32]> = dataset.rows().collect();
        let mut sampler = RandomSampler::with_seed(self.config.seed);

        let mut centers = match self.config.init_method {
            KMeansInit::Random => sampler
                .sample_indices(n, k)
                .into_iter()
                .map(|i| data[i].to_vec())
                .collect(),
            KMeansInit::KMeansPlusPlus => Self::kmeans_plusplus_init(&data, k, &mut sampler),
        };

        let mut prev_inertia = f64::INFINITY;
        let mut num_iterations = 0;
        let mut converged = false;

        for iter in 0..self.config.max_iterations {
            num_iterations = iter + 1;

            // Assignment step
            let (assignments, inertia) = Self::assign_clusters(&data, &centers);

            // Check convergence
            let relative_change = (prev_inertia - inertia).abs() / (prev_inertia + 1e-10);
            if relative_change < self.config.convergence_threshold {
                converged = true;
                break;
            }
            prev_inertia = inertia;

            // Update step
            centers = Self::update_centers(&data, &assignments, &centers);
        }

        // Final assignment against the final centers
        let (assignments, inertia) = Self::assign_clusters(&data, &centers);

        let mut cluster_sizes = vec![0usize; k];
        for &a in &assignments {
            cluster_sizes[a] += 1;
        }

        Ok(KMeansResult {
            centers,
            assignments,
            cluster_sizes,
            inertia,
            num_iterations,
            converged,
        })
    }

    /// K-means++ initialization.
    fn kmeans_plusplus_init(data: &[&[f32]], k: usize, sampler: &mut RandomSampler) -> Vec<Vec<f32>> {
        let n = data.len();
        let mut centers: Vec<Vec<f32>> = Vec::with_capacity(k);

        // Choose first center randomly
        let first_idx = sampler.sample_indices(n, 1)[0];
        centers.push(data[first_idx].to_vec());

        // Distance to nearest center for each point
        let mut min_distances: Vec<f32> = data
            .iter()
            .map(|p| squared_l2_dense(p, &centers[0]))
            .collect();

        for _ in 1..k {
            // Sample proportional to squared distance
            let total: f32 = min_distances.iter().sum();
            let selected = if total == 0.0 {
                // All remaining points are duplicates of centers
                sampler.sample_indices(n, 1)[0]
            } else {
                let threshold = sampler.random_f32() * total;
                let mut cumulative = 0.0f32;
                let mut selected = n - 1;
                for (i, &d) in min_distances.iter().enumerate() {
                    cumulative += d;
                    if cumulative >= threshold {
                        selected = i;
                        break;
                    }
                }
                selected
            };
            let new_center = data[selected].to_vec();

            // Update minimum distances
            for (point, d) in data.iter().zip(min_distances.iter_mut()) {
                let new_dist = squared_l2_dense(point, &new_center);
                if new_dist < *d {
                    *d = new_dist;
                }
            }
            centers.push(new_center);
        }

        centers
    }

    /// Assign points to nearest clusters. Ties go to the lower center index.
    fn assign_clusters(data: &[&[f32]], centers: &[Vec<f32>]) -> (Vec<usize>, f64) {
        let assignments: Vec<(usize, f32)> =
            maybe_parallel_map_threshold(data, KMEANS_PARALLEL_THRESHOLD, |point| {
                let mut min_dist = f32::INFINITY;
                let mut min_idx = 0;
                for (i, center) in centers.iter().enumerate() {
                    let dist = squared_l2_dense(point, center);
                    if dist < min_dist {
                        min_dist = dist;
                        min_idx = i;
                    }
                }
                (min_idx, min_dist)
            });

        let inertia: f64 = assignments.iter().map(|(_, d)| *d as f64).sum();
        let assignments: Vec<usize> = assignments.into_iter().map(|(a, _)| a).collect();

        (assignments, inertia)
    }

    /// Update cluster centers. Empty clusters keep their previous center.
    fn update_centers(data: &[&[f32]], assignments: &[usize], previous: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let k = previous.len();
        let dim = previous.first().map(|c| c.len()).unwrap_or(0);
        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0usize; k];

        for (point, &cluster) in data.iter().zip(assignments.iter()) {
            counts[cluster] += 1;
            for (s, &v) in sums[cluster].iter_mut().zip(point.iter()) {
                *s += v as f64;
            }
        }

        sums.iter()
            .zip(counts.iter())
            .zip(previous.iter())
            .map(|((sum, &count), prev)| {
                if count > 0 {
                    sum.iter().map(|&s| (s / count as f64) as f32).collect()
                } else {
                    prev.clone()
                }
            })
            .collect()
    }
}
