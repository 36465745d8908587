//! Two-level routing: a top-level model plus one sub-model per top-level bucket.

use super::{BucketRanking, RoutingModel};
use crate::data_format::DenseDataset;
use crate::error::{IndexError, Result};
use crate::types::BucketId;

/// A top-level router with exclusively owned per-bucket sub-routers.
///
/// A missing sub-router marks a top-level bucket too small to split; every
/// query routed there lands in sub-bucket 0.
pub struct HierarchicalRouter {
    top: Box<dyn RoutingModel>,
    subs: Vec<Option<Box<dyn RoutingModel>>>,
}

impl HierarchicalRouter {
    /// Assemble a router. `subs` must have one slot per top-level bucket.
    pub fn new(top: Box<dyn RoutingModel>, subs: Vec<Option<Box<dyn RoutingModel>>>) -> Result<Self> {
        if subs.len() != top.num_buckets() {
            return Err(IndexError::invalid_argument(format!(
                "{} sub-routers for {} top-level buckets",
                subs.len(),
                top.num_buckets()
            )));
        }
        Ok(Self { top, subs })
    }

    /// The top-level model.
    pub fn top(&self) -> &dyn RoutingModel {
        self.top.as_ref()
    }

    /// Sub-router of a top-level bucket, if that bucket was split.
    pub fn sub(&self, bucket: BucketId) -> Option<&dyn RoutingModel> {
        self.subs.get(bucket as usize).and_then(|s| s.as_deref())
    }

    /// Number of top-level buckets.
    pub fn num_top_buckets(&self) -> usize {
        self.subs.len()
    }

    /// Number of sub-buckets under a top-level bucket (1 when unsplit).
    pub fn num_sub_buckets(&self, bucket: BucketId) -> usize {
        self.sub(bucket).map(|s| s.num_buckets()).unwrap_or(1)
    }

    /// True once the top-level model is trained.
    pub fn is_trained(&self) -> bool {
        self.top.is_trained()
    }

    /// Ranked sub-buckets of `bucket` for every row of `queries`.
    pub fn sub_ranking(&self, bucket: BucketId, queries: &DenseDataset) -> Result<Vec<Vec<BucketId>>> {
        if bucket as usize >= self.subs.len() {
            return Err(IndexError::out_of_range(format!(
                "top-level bucket {} of {}",
                bucket,
                self.subs.len()
            )));
        }
        match self.sub(bucket) {
            Some(model) => Ok(model.predict_proba(queries)?.ranked),
            None => Ok(vec![vec![0]; queries.size()]),
        }
    }

    /// Top-level ranking for every query.
    pub fn top_ranking(&self, queries: &DenseDataset) -> Result<BucketRanking> {
        self.top.predict_proba(queries)
    }
}

impl std::fmt::Debug for HierarchicalRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalRouter")
            .field("top_buckets", &self.subs.len())
            .field("split_buckets", &self.subs.iter().filter(|s| s.is_some()).count())
            .finish()
    }
}
