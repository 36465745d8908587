//! The learned index: build orchestration and search entry points.
//!
//! [`LearnedIndex::build`] clusters the points, trains the router(s) and
//! freezes the point-to-bucket mapping. Searches then run against that frozen
//! state; the index never mutates it until the next build.

use crate::config::{LearnedIndexConfig, SearchConfig};
use crate::data_format::DenseDataset;
use crate::error::{IndexError, Result};
use crate::partitioning::PartitionBuilder;
use crate::routing::{fit_router, HierarchicalRouter, ModelKind, RoutingModel, TrainingConfig};
use crate::search::{BucketProbeSearch, BucketTable, RoundOutput, SearchOutput};
use crate::types::{BucketId, CompoundBucket};
use crate::utils::derive_seed;
use rayon::prelude::*;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of a finished build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Level-1 cluster label of every point.
    pub labels: Vec<BucketId>,

    /// Level-1 router prediction of every point; this is the bucket searched.
    pub predictions: Vec<BucketId>,

    /// Level-2 cluster label of every point (two-level builds only).
    pub sub_labels: Option<Vec<BucketId>>,

    /// Level-2 router prediction of every point (two-level builds only).
    pub sub_predictions: Option<Vec<BucketId>>,

    /// Number of level-1 buckets the router ranks.
    pub num_buckets: usize,

    /// Size of every non-empty searchable bucket, keyed by its level-1 id.
    /// Two-level builds report the level-1 bucket of each compound key.
    pub bucket_sizes: Vec<(BucketId, usize)>,

    /// Mean loss of the level-1 router's last epoch.
    pub final_loss: f32,

    /// Wall time of the whole build.
    pub elapsed: Duration,
}

enum Routing {
    Flat {
        router: Box<dyn RoutingModel>,
        table: BucketTable<BucketId>,
    },
    TwoLevel {
        router: HierarchicalRouter,
        table: BucketTable<CompoundBucket>,
    },
}

struct IndexState {
    routing: Routing,
    num_points: usize,
    predictions: Vec<BucketId>,
    sub_predictions: Option<Vec<BucketId>>,
}

/// Level-2 artifacts of one top-level bucket.
struct SubBuild {
    router: Option<Box<dyn RoutingModel>>,
    labels: Vec<BucketId>,
    predictions: Vec<BucketId>,
}

/// A learned ANN index over a fixed point set.
pub struct LearnedIndex {
    config: LearnedIndexConfig,
    state: Option<IndexState>,
}

impl LearnedIndex {
    /// Create an untrained index.
    pub fn new(config: LearnedIndexConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Build configuration.
    pub fn config(&self) -> &LearnedIndexConfig {
        &self.config
    }

    /// True once [`build`](Self::build) has succeeded.
    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    /// Number of points the index was built over.
    pub fn num_points(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.num_points)
    }

    /// Level-1 bucket searched for every point.
    pub fn predictions(&self) -> Option<&[BucketId]> {
        self.state.as_ref().map(|s| s.predictions.as_slice())
    }

    /// Level-2 bucket searched for every point.
    pub fn sub_predictions(&self) -> Option<&[BucketId]> {
        self.state.as_ref().and_then(|s| s.sub_predictions.as_deref())
    }

    /// Cluster `points`, train the router(s) and freeze bucket membership.
    ///
    /// Rebuilding replaces any previous state. A failed build leaves the
    /// previous state untouched.
    pub fn build(&mut self, points: &DenseDataset) -> Result<BuildReport> {
        self.config.validate()?;
        if points.is_empty() {
            return Err(IndexError::invalid_argument("cannot build over an empty dataset"));
        }
        if points.size() > u32::MAX as usize {
            return Err(IndexError::invalid_argument("too many points for 32-bit ids"));
        }

        let start = Instant::now();
        let partition = self.partition_builder(self.config.seed).cluster(points, self.config.bucket_count)?;
        let (top, training) = fit_router(
            self.config.model_kind,
            points,
            &partition.labels,
            partition.num_buckets,
            &self.training_config(self.config.seed),
        )?;
        let predictions = top.predict(points)?;
        info!(
            points = points.size(),
            buckets = partition.num_buckets,
            loss = training.final_loss,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "level-1 router trained"
        );

        let num_buckets = partition.num_buckets;
        let (routing, sub_labels, sub_predictions) = if self.config.is_hierarchical() {
            let subs = self.build_sub_levels(points, &predictions, num_buckets)?;
            let mut sub_labels = vec![0; points.size()];
            let mut sub_predictions = vec![0; points.size()];
            let mut routers = Vec::with_capacity(subs.len());
            for (positions, sub) in members_by_bucket(&predictions, num_buckets).iter().zip(subs) {
                for (i, &pos) in positions.iter().enumerate() {
                    sub_labels[pos] = sub.labels[i];
                    sub_predictions[pos] = sub.predictions[i];
                }
                routers.push(sub.router);
            }

            let router = HierarchicalRouter::new(Box::new(top), routers)?;
            let table = BucketTable::from_assignments(
                predictions
                    .iter()
                    .copied()
                    .zip(sub_predictions.iter().copied()),
            );
            (
                Routing::TwoLevel { router, table },
                Some(sub_labels),
                Some(sub_predictions),
            )
        } else {
            let table = BucketTable::from_assignments(predictions.iter().copied());
            (
                Routing::Flat {
                    router: Box::new(top),
                    table,
                },
                None,
                None,
            )
        };

        let bucket_sizes = match &routing {
            Routing::Flat { table, .. } => table.sizes(),
            Routing::TwoLevel { table, .. } => table
                .sizes()
                .into_iter()
                .map(|((top, _), size)| (top, size))
                .collect(),
        };

        self.state = Some(IndexState {
            routing,
            num_points: points.size(),
            predictions: predictions.clone(),
            sub_predictions: sub_predictions.clone(),
        });

        let report = BuildReport {
            labels: partition.labels,
            predictions,
            sub_labels,
            sub_predictions,
            num_buckets,
            bucket_sizes,
            final_loss: training.final_loss,
            elapsed: start.elapsed(),
        };
        info!(
            levels = self.config.levels,
            searchable_buckets = report.bucket_sizes.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "index built"
        );
        Ok(report)
    }

    /// Search `data` for the `k` nearest neighbors of every query.
    ///
    /// `queries_nav` drives routing and `queries_search` drives the exact
    /// distance computation; pass the same dataset twice when they coincide.
    /// `data` must be the point set (or a same-sized re-embedding of it) the
    /// index was built over.
    pub fn search(
        &self,
        data: &DenseDataset,
        queries_nav: &DenseDataset,
        queries_search: &DenseDataset,
        config: &SearchConfig,
    ) -> Result<SearchOutput> {
        let state = self.trained_state()?;
        config.validate()?;
        self.check_data(state, data)?;

        let engine = self.config.distance_measure;
        let searcher = BucketProbeSearch::new(&engine, config.k)?;
        match &state.routing {
            Routing::Flat { router, table } => searcher.search(
                router.as_ref(),
                table,
                data,
                queries_nav,
                queries_search,
                config.n_buckets,
                config.use_threshold,
            ),
            Routing::TwoLevel { router, table } => searcher.search_two_levels(
                router,
                table,
                data,
                queries_nav,
                queries_search,
                config.n_buckets,
                config.use_threshold,
            ),
        }
    }

    /// One probe round in each query's most probable bucket.
    ///
    /// On a two-level index this visits the best compound bucket.
    pub fn search_single(
        &self,
        data: &DenseDataset,
        queries_nav: &DenseDataset,
        queries_search: &DenseDataset,
        k: usize,
        thresholds: Option<&[f32]>,
    ) -> Result<RoundOutput> {
        let state = self.trained_state()?;
        self.check_data(state, data)?;
        check_query_counts(queries_nav, queries_search)?;

        let engine = self.config.distance_measure;
        let searcher = BucketProbeSearch::new(&engine, k)?;
        match &state.routing {
            Routing::Flat { router, table } => {
                let predicted = router.predict(queries_nav)?;
                searcher.search_single(table, data, queries_search, &predicted, thresholds)
            }
            Routing::TwoLevel { router, table } => searcher.search_single_two_levels(
                router,
                table,
                data,
                queries_nav,
                queries_search,
                thresholds,
            ),
        }
    }

    /// One probe round in each query's best compound bucket.
    ///
    /// Fails on an index built with a single level.
    pub fn search_single_two_levels(
        &self,
        data: &DenseDataset,
        queries_nav: &DenseDataset,
        queries_search: &DenseDataset,
        k: usize,
        thresholds: Option<&[f32]>,
    ) -> Result<RoundOutput> {
        let state = self.trained_state()?;
        match state.routing {
            Routing::TwoLevel { .. } => self.search_single(data, queries_nav, queries_search, k, thresholds),
            Routing::Flat { .. } => Err(IndexError::failed_precondition(
                "index was built with a single level",
            )),
        }
    }

    fn trained_state(&self) -> Result<&IndexState> {
        self.state
            .as_ref()
            .ok_or_else(|| IndexError::not_trained("Index is not trained, call `build` first"))
    }

    fn check_data(&self, state: &IndexState, data: &DenseDataset) -> Result<()> {
        if data.size() != state.num_points {
            return Err(IndexError::invalid_argument(format!(
                "index was built over {} points but search data has {}",
                state.num_points,
                data.size()
            )));
        }
        Ok(())
    }

    fn partition_builder(&self, seed: u64) -> PartitionBuilder {
        PartitionBuilder::new(seed).with_max_iterations(self.config.kmeans_max_iterations)
    }

    fn training_config(&self, seed: u64) -> TrainingConfig {
        TrainingConfig {
            epochs: self.config.epochs,
            learning_rate: self.config.learning_rate,
            batch_size: self.config.batch_size,
            hidden_dim: self.config.hidden_dim,
            seed,
        }
    }

    /// Re-cluster the members of every level-1 bucket and train its router.
    ///
    /// Buckets are independent and seeded from their own id, so they are
    /// built in parallel without affecting the result.
    fn build_sub_levels(
        &self,
        points: &DenseDataset,
        predictions: &[BucketId],
        num_buckets: usize,
    ) -> Result<Vec<SubBuild>> {
        let start = Instant::now();
        let members = members_by_bucket(predictions, num_buckets);
        let subs = members
            .par_iter()
            .enumerate()
            .map(|(bucket, positions)| self.build_sub_level(points, bucket, positions))
            .collect::<Result<Vec<_>>>()?;

        info!(
            top_buckets = num_buckets,
            split = subs.iter().filter(|s| s.router.is_some()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "level-2 routers trained"
        );
        Ok(subs)
    }

    fn build_sub_level(&self, points: &DenseDataset, bucket: usize, positions: &[usize]) -> Result<SubBuild> {
        let seed = derive_seed(self.config.seed, bucket as u64 + 1);
        let subset = points.subset(positions);
        let partition = self.partition_builder(seed).cluster(&subset, self.config.bucket_count)?;
        if partition.is_degenerate() {
            debug!(bucket, points = positions.len(), "bucket left unsplit");
            return Ok(SubBuild {
                router: None,
                labels: partition.labels.clone(),
                predictions: partition.labels,
            });
        }

        let (model, report) = fit_router(
            self.config.model_kind,
            &subset,
            &partition.labels,
            partition.num_buckets,
            &self.training_config(seed),
        )?;
        let predictions = model.predict(&subset)?;
        debug!(
            bucket,
            points = positions.len(),
            sub_buckets = partition.num_buckets,
            loss = report.final_loss,
            "bucket split"
        );
        Ok(SubBuild {
            router: Some(Box::new(model)),
            labels: partition.labels,
            predictions,
        })
    }
}

impl std::fmt::Debug for LearnedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnedIndex")
            .field("config", &self.config)
            .field("trained", &self.is_trained())
            .field("num_points", &self.num_points())
            .finish()
    }
}

/// Builder for configuring and building a [`LearnedIndex`] in one go.
pub struct LearnedIndexBuilder {
    config: LearnedIndexConfig,
}

impl LearnedIndexBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: LearnedIndexConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LearnedIndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of buckets per level.
    pub fn bucket_count(mut self, n: usize) -> Self {
        self.config.bucket_count = n;
        self
    }

    /// Set the training epochs.
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    /// Set the classifier architecture.
    pub fn model_kind(mut self, kind: ModelKind) -> Self {
        self.config.model_kind = kind;
        self
    }

    /// Build a two-level hierarchy.
    pub fn two_levels(mut self) -> Self {
        self.config.levels = 2;
        self
    }

    /// Set the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Build the index over `points`.
    pub fn build(self, points: &DenseDataset) -> Result<(LearnedIndex, BuildReport)> {
        let mut index = LearnedIndex::new(self.config);
        let report = index.build(points)?;
        Ok((index, report))
    }
}

impl Default for LearnedIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn members_by_bucket(assignments: &[BucketId], num_buckets: usize) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); num_buckets];
    for (i, &b) in assignments.iter().enumerate() {
        if let Some(m) = members.get_mut(b as usize) {
            m.push(i);
        }
    }
    members
}

fn check_query_counts(queries_nav: &DenseDataset, queries_search: &DenseDataset) -> Result<()> {
    if queries_nav.size() != queries_search.size() {
        return Err(IndexError::invalid_argument(format!(
            "{} navigation queries but {} search queries",
            queries_nav.size(),
            queries_search.size()
        )));
    }
    Ok(())
}
