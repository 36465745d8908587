//! Probing compound (top bucket, sub-bucket) keys.
//!
//! Each query gets a probe plan: compound keys ordered by top-level rank
//! first and sub-level rank second. Round `r` visits the `r`-th key of each
//! plan; queries whose plan is shorter sit the round out.

use super::probe::{BucketProbeSearch, RoundOutput, SearchOutput};
use super::{BucketTable, SearchTimings};
use crate::data_format::DenseDataset;
use crate::error::{IndexError, Result};
use crate::routing::HierarchicalRouter;
use crate::types::{BucketId, CompoundBucket};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Up to `n_buckets` compound keys per query, in probe order.
pub fn probe_plan(
    router: &HierarchicalRouter,
    queries_nav: &DenseDataset,
    n_buckets: usize,
) -> Result<Vec<Vec<CompoundBucket>>> {
    let num_queries = queries_nav.size();
    let top = router.top_ranking(queries_nav)?;
    if top.len() != num_queries {
        return Err(IndexError::internal(format!(
            "router ranked {} of {} queries",
            top.len(),
            num_queries
        )));
    }

    let mut plans: Vec<Vec<CompoundBucket>> = vec![Vec::new(); num_queries];

    for rank in 0..top.width() {
        let mut pending: BTreeMap<BucketId, Vec<usize>> = BTreeMap::new();
        for (q, plan) in plans.iter().enumerate() {
            if plan.len() < n_buckets {
                if let Some(&bucket) = top.ranked[q].get(rank) {
                    pending.entry(bucket).or_default().push(q);
                }
            }
        }
        if pending.is_empty() {
            break;
        }

        for (bucket, query_ids) in pending {
            let group = queries_nav.subset(&query_ids);
            let sub_ranked = router.sub_ranking(bucket, &group)?;
            for (&q, ranked) in query_ids.iter().zip(sub_ranked) {
                let room = n_buckets - plans[q].len();
                plans[q].extend(ranked.into_iter().take(room).map(|sub| (bucket, sub)));
            }
        }
    }

    Ok(plans)
}

impl<'a> BucketProbeSearch<'a> {
    /// One round over the best compound key of every query.
    pub fn search_single_two_levels(
        &self,
        router: &HierarchicalRouter,
        table: &BucketTable<CompoundBucket>,
        data: &DenseDataset,
        queries_nav: &DenseDataset,
        queries_search: &DenseDataset,
        thresholds: Option<&[f32]>,
    ) -> Result<RoundOutput> {
        let plans = probe_plan(router, queries_nav, 1)?;
        let routed: Vec<Option<CompoundBucket>> =
            plans.iter().map(|p| p.first().copied()).collect();
        self.search_round(table, data, queries_search, &routed, thresholds)
    }

    /// Full probe search over the `n_buckets` best compound keys.
    #[allow(clippy::too_many_arguments)]
    pub fn search_two_levels(
        &self,
        router: &HierarchicalRouter,
        table: &BucketTable<CompoundBucket>,
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
        let plans = probe_plan(router, queries_nav, n_buckets)?;
        timings.inference = inference_start.elapsed();

        let n_rounds = plans.iter().map(Vec::len).max().unwrap_or(0);
        if n_rounds < n_buckets {
            debug!(
                requested = n_buckets,
                available = n_rounds,
                "probe depth capped at compound bucket count"
            );
        }

        let rows = self.run_rounds(
            table,
            data,
            queries_search,
            n_rounds,
            use_threshold,
            |r| Ok(plans.iter().map(|p| p.get(r).copied()).collect()),
            &mut timings,
        )?;
        timings.total = start.elapsed();

        info!(
            queries = queries_search.size(),
            rounds = n_rounds,
            inference_ms = timings.inference.as_secs_f64() * 1e3,
            threshold_ms = timings.threshold.as_secs_f64() * 1e3,
            total_ms = timings.total.as_secs_f64() * 1e3,
            "two-level search finished"
        );
        Ok(SearchOutput {
            rows,
            timings,
            rounds: n_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{BucketRanking, RoutingModel};

    /// Router ranking buckets by a fixed preference, ignoring the query.
    struct FixedRouter {
        probabilities: Vec<f32>,
    }

    impl RoutingModel for FixedRouter {
        fn num_buckets(&self) -> usize {
            self.probabilities.len()
        }

        fn is_trained(&self) -> bool {
            true
        }

        fn predict_proba(&self, queries: &DenseDataset) -> Result<BucketRanking> {
            Ok(BucketRanking::from_probabilities(vec![
                self.probabilities.clone();
                queries.size()
            ]))
        }
    }

    fn router() -> HierarchicalRouter {
        let top = Box::new(FixedRouter {
            probabilities: vec![0.2, 0.8],
        });
        let subs: Vec<Option<Box<dyn RoutingModel>>> = vec![
            Some(Box::new(FixedRouter {
                probabilities: vec![0.1, 0.6, 0.3],
            })),
            None,
        ];
        HierarchicalRouter::new(top, subs).unwrap()
    }

    #[test]
    fn test_plan_orders_top_rank_first() {
        let queries = DenseDataset::from_vecs(vec![vec![0.0], vec![1.0]]).unwrap();
        let plans = probe_plan(&router(), &queries, 10).unwrap();
        for plan in &plans {
            assert_eq!(plan, &vec![(1, 0), (0, 1), (0, 2), (0, 0)]);
        }
    }

    #[test]
    fn test_plan_truncates_to_n_buckets() {
        let queries = DenseDataset::from_vecs(vec![vec![0.0]]).unwrap();
        let plans = probe_plan(&router(), &queries, 2).unwrap();
        assert_eq!(plans[0], vec![(1, 0), (0, 1)]);
    }

    #[test]
    fn test_two_level_search_visits_planned_buckets() {
        let data = DenseDataset::from_vecs(vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let table = BucketTable::from_assignments(vec![(1u32, 0u32), (0, 1), (0, 2), (0, 0)]);
        let queries = DenseDataset::from_vecs(vec![vec![3.0]]).unwrap();
        let engine = crate::distance_measures::DistanceMeasure::SquaredL2;
        let search = BucketProbeSearch::new(&engine, 1).unwrap();
        let router = router();

        let single = search
            .search_single_two_levels(&router, &table, &data, &queries, &queries, None)
            .unwrap();
        assert_eq!(single.rows.neighbors(0), &[0]);

        let full = search
            .search_two_levels(&router, &table, &data, &queries, &queries, 4, false)
            .unwrap();
        assert_eq!(full.rounds, 4);
        assert_eq!(full.neighbors(0), &[3]);
        assert_eq!(full.distances(0), &[0.0]);
    }
}
