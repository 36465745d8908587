//! Probability-ranked bucket probing.
//!
//! A search runs the router once, then visits buckets round by round: in
//! round `r` every query is routed to its `r`-th most probable bucket, exact
//! distances are computed against that bucket's members only, and the round's
//! top-k is merged into the running top-k.

use super::{BucketTable, ResultRows, RoundTimings, SearchTimings};
use crate::data_format::DenseDataset;
use crate::distance_measures::DistanceEngine;
use crate::error::{IndexError, Result};
use crate::routing::RoutingModel;
use crate::types::{BucketId, PointIndex};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Result of a single probe round.
#[derive(Debug, Clone)]
pub struct RoundOutput {
    /// `num_queries x k` rows; queries not routed anywhere keep empty rows.
    pub rows: ResultRows,
    /// Time breakdown of the round.
    pub timings: RoundTimings,
}

/// Result of a multi-round search.
#[derive(Debug, Clone)]
pub struct SearchOutput {
    /// Final `num_queries x k` rows, ascending by distance.
    pub rows: ResultRows,
    /// Time breakdown of the search.
    pub timings: SearchTimings,
    /// Probe rounds actually executed.
    pub rounds: usize,
}

impl SearchOutput {
    /// Number of query rows.
    pub fn num_queries(&self) -> usize {
        self.rows.num_queries()
    }

    /// Distances of query `q`.
    pub fn distances(&self, q: usize) -> &[f32] {
        self.rows.distances(q)
    }

    /// Neighbor ids of query `q`.
    pub fn neighbors(&self, q: usize) -> &[PointIndex] {
        self.rows.neighbors(q)
    }
}

/// Exact top-k search restricted to routed buckets.
pub struct BucketProbeSearch<'a> {
    engine: &'a dyn DistanceEngine,
    k: usize,
}

impl<'a> BucketProbeSearch<'a> {
    /// Create a searcher returning `k` neighbors per query.
    pub fn new(engine: &'a dyn DistanceEngine, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(IndexError::invalid_argument("k must be >= 1"));
        }
        Ok(Self { engine, k })
    }

    /// Result width.
    pub fn k(&self) -> usize {
        self.k
    }

    /// One probe round over arbitrary bucket keys.
    ///
    /// `routed[q]` names the bucket query `q` visits this round, or `None` to
    /// sit the round out. With `thresholds`, members farther than
    /// `thresholds[q]` from every query of their group may be skipped.
    ///
    /// A bucket with `m < k` usable candidates fills the rest of each row by
    /// repeating its last candidate, with the repeats carrying the engine's
    /// [`sentinel`](DistanceEngine::sentinel).
    pub fn search_round<K: Ord + Copy>(
        &self,
        table: &BucketTable<K>,
        data: &DenseDataset,
        queries: &DenseDataset,
        routed: &[Option<K>],
        thresholds: Option<&[f32]>,
    ) -> Result<RoundOutput> {
        let start = Instant::now();
        self.check_shapes(table.num_points(), data, queries, routed.len(), thresholds)?;

        let sentinel = self.engine.sentinel();
        let mut rows = ResultRows::empty(queries.size(), self.k, sentinel);
        let mut timings = RoundTimings::default();

        let mut groups: BTreeMap<K, Vec<usize>> = BTreeMap::new();
        for (q, key) in routed.iter().enumerate() {
            if let Some(key) = key {
                groups.entry(*key).or_default().push(q);
            }
        }

        for (key, query_ids) in groups {
            let members = table.members(&key);
            if members.is_empty() || query_ids.is_empty() {
                continue;
            }

            let pairwise_start = Instant::now();
            let query_rows = queries.select_rows(&query_ids);
            let member_positions: Vec<usize> = members.iter().map(|&m| m as usize).collect();
            let member_rows = data.select_rows(&member_positions);

            let (matrix, candidates) = match thresholds {
                Some(all) => {
                    let group_thresholds: Vec<f32> = query_ids.iter().map(|&q| all[q]).collect();
                    let kernel_start = Instant::now();
                    let pruned =
                        self.engine
                            .pairwise_threshold(&query_rows, &member_rows, &group_thresholds);
                    timings.pure_pairwise += kernel_start.elapsed();
                    match pruned {
                        // Nothing in this bucket can improve any routed query.
                        None => continue,
                        Some(p) => {
                            let kept: Vec<PointIndex> = p.kept.iter().map(|&j| members[j]).collect();
                            (p.distances, kept)
                        }
                    }
                }
                None => {
                    let kernel_start = Instant::now();
                    let matrix = self.engine.pairwise(&query_rows, &member_rows);
                    timings.pure_pairwise += kernel_start.elapsed();
                    (matrix, members.to_vec())
                }
            };
            timings.pairwise += pairwise_start.elapsed();

            let sort_start = Instant::now();
            for (row, &q) in matrix.iter().zip(query_ids.iter()) {
                let (ids, dists) = top_k_padded(row, &candidates, self.k, sentinel);
                rows.set_row(q, &ids, &dists);
            }
            timings.sort += sort_start.elapsed();
        }

        timings.elapsed = start.elapsed();
        Ok(RoundOutput { rows, timings })
    }

    /// One probe round with a single predicted bucket per query.
    pub fn search_single(
        &self,
        table: &BucketTable<BucketId>,
        data: &DenseDataset,
        queries: &DenseDataset,
        predicted: &[BucketId],
        thresholds: Option<&[f32]>,
    ) -> Result<RoundOutput> {
        let routed: Vec<Option<BucketId>> = predicted.iter().copied().map(Some).collect();
        self.search_round(table, data, queries, &routed, thresholds)
    }

    /// Full probe search over the `n_buckets` most probable buckets.
    ///
    /// The router runs once on `queries_nav`; distances use `queries_search`
    /// against `data`. When `use_threshold` is set, rounds after the first are
    /// bounded by the worst distance in each query's running top-k.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        router: &dyn RoutingModel,
        table: &BucketTable<BucketId>,
        data: &DenseDataset,
        queries_nav: &DenseDataset,
        queries_search: &DenseDataset,
        n_buckets: usize,
        use_threshold: bool,
    ) -> Result<SearchOutput> {
        let start = Instant::now();
        if n_buckets == 0 {
            return Err(IndexError::invalid_argument("n_buckets must be >= 1"));
        }
        if queries_nav.size() != queries_search.size() {
            return Err(IndexError::invalid_argument(format!(
                "{} navigation queries but {} search queries",
                queries_nav.size(),
                queries_search.size()
            )));
        }

        let mut timings = SearchTimings::default();
        let inference_start = Instant::now();
        let ranking = router.predict_proba(queries_nav)?;
        timings.inference = inference_start.elapsed();
        if ranking.len() != queries_nav.size() {
            return Err(IndexError::internal(format!(
                "router ranked {} of {} queries",
                ranking.len(),
                queries_nav.size()
            )));
        }

        let n_rounds = n_buckets.min(ranking.width());
        if n_rounds < n_buckets {
            debug!(
                requested = n_buckets,
                available = ranking.width(),
                "probe depth capped at bucket count"
            );
        }

        let rows = self.run_rounds(
            table,
            data,
            queries_search,
            n_rounds,
            use_threshold,
            |r| Ok(ranking.column(r)),
            &mut timings,
        )?;
        timings.total = start.elapsed();

        info!(
            queries = queries_search.size(),
            rounds = n_rounds,
            inference_ms = timings.inference.as_secs_f64() * 1e3,
            threshold_ms = timings.threshold.as_secs_f64() * 1e3,
            total_ms = timings.total.as_secs_f64() * 1e3,
            "search finished"
        );
        Ok(SearchOutput {
            rows,
            timings,
            rounds: n_rounds,
        })
    }

    /// Shared round loop: route, search, merge.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_rounds<K, F>(
        &self,
        table: &BucketTable<K>,
        data: &DenseDataset,
        queries: &DenseDataset,
        n_rounds: usize,
        use_threshold: bool,
        mut route: F,
        timings: &mut SearchTimings,
    ) -> Result<ResultRows>
    where
        K: Ord + Copy,
        F: FnMut(usize) -> Result<Vec<Option<K>>>,
    {
        let mut running: Option<ResultRows> = None;

        for round in 0..n_rounds {
            let thresholds = match &running {
                Some(rows) if use_threshold => {
                    let threshold_start = Instant::now();
                    let worst = rows.worst_distances();
                    timings.threshold += threshold_start.elapsed();
                    Some(worst)
                }
                _ => None,
            };

            let routed = route(round)?;
            let output = self.search_round(table, data, queries, &routed, thresholds.as_deref())?;
            timings.push_round(output.timings);

            running = Some(match running.take() {
                None => output.rows,
                Some(mut rows) => {
                    let merge_start = Instant::now();
                    rows.merge(&output.rows)?;
                    timings.merge += merge_start.elapsed();
                    rows
                }
            });
            debug!(
                round,
                elapsed_us = output.timings.elapsed.as_micros() as u64,
                "probe round finished"
            );
        }

        Ok(running
            .unwrap_or_else(|| ResultRows::empty(queries.size(), self.k, self.engine.sentinel())))
    }

    fn check_shapes(
        &self,
        table_points: usize,
        data: &DenseDataset,
        queries: &DenseDataset,
        routed: usize,
        thresholds: Option<&[f32]>,
    ) -> Result<()> {
        if table_points != data.size() {
            return Err(IndexError::invalid_argument(format!(
                "bucket table covers {} points but data has {}",
                table_points,
                data.size()
            )));
        }
        if routed != queries.size() {
            return Err(IndexError::invalid_argument(format!(
                "{} routed buckets for {} queries",
                routed,
                queries.size()
            )));
        }
        if !data.is_empty() && !queries.is_empty() && data.dimensionality() != queries.dimensionality() {
            return Err(IndexError::invalid_argument(format!(
                "query dimensionality {} does not match data dimensionality {}",
                queries.dimensionality(),
                data.dimensionality()
            )));
        }
        if let Some(t) = thresholds {
            if t.len() != queries.size() {
                return Err(IndexError::invalid_argument(format!(
                    "{} thresholds for {} queries",
                    t.len(),
                    queries.size()
                )));
            }
        }
        Ok(())
    }
}

/// The `k` nearest candidates of one distance row, edge-padded to length `k`.
///
/// Ordering is ascending by distance with ties broken by candidate position.
/// Padding repeats the last candidate id and gives the repeats `sentinel`.
fn top_k_padded(
    row: &[f32],
    candidates: &[PointIndex],
    k: usize,
    sentinel: f32,
) -> (Vec<PointIndex>, Vec<f32>) {
    let key = |&j: &usize| (OrderedFloat(row[j]), j);

    let mut order: Vec<usize> = (0..row.len()).collect();
    if order.len() > k {
        order.select_nth_unstable_by_key(k - 1, key);
        order.truncate(k);
    }
    order.sort_unstable_by_key(key);

    let mut ids: Vec<PointIndex> = order.iter().map(|&j| candidates[j]).collect();
    let mut dists: Vec<f32> = order.iter().map(|&j| row[j]).collect();
    if ids.len() < k {
        let last = ids.last().copied().unwrap_or(0);
        ids.resize(k, last);
        dists.resize(k, sentinel);
    }
    (ids, dists)
}
