//! Routing models: classifiers that map a vector to a ranked list of buckets.
//!
//! The probe loop only talks to [`RoutingModel`]. A trained
//! [`MlpClassifier`] is the built-in implementation; a
//! [`HierarchicalRouter`] pairs a top-level model with one sub-model per
//! top-level bucket.

mod hierarchical;
mod mlp;
mod trainer;

pub use hierarchical::HierarchicalRouter;
pub use mlp::MlpClassifier;
pub use trainer::{fit_router, TrainingConfig, TrainingReport};

use crate::data_format::DenseDataset;
use crate::error::Result;
use crate::types::BucketId;
use serde::{Deserialize, Serialize};

/// Classifier architecture used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// One hidden ReLU layer followed by a softmax output layer.
    #[default]
    Mlp,

    /// Multinomial logistic regression (softmax over a single linear layer).
    Linear,
}

impl ModelKind {
    /// Get the name of this model kind.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Mlp => "MLP",
            ModelKind::Linear => "Linear",
        }
    }
}

/// Output of [`RoutingModel::predict_proba`].
///
/// Row `q` describes query `q`: `probabilities[q][b]` is the score of bucket
/// `b`, and `ranked[q]` lists every bucket id from most to least probable
/// (ties go to the lower bucket id).
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRanking {
    /// Raw per-bucket probabilities.
    pub probabilities: Vec<Vec<f32>>,

    /// Bucket ids in descending probability order.
    pub ranked: Vec<Vec<BucketId>>,
}

impl BucketRanking {
    /// Build a ranking from per-query probability rows.
    pub fn from_probabilities(probabilities: Vec<Vec<f32>>) -> Self {
        let ranked = probabilities.iter().map(|row| rank_descending(row)).collect();
        Self {
            probabilities,
            ranked,
        }
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Number of ranked buckets per query.
    pub fn width(&self) -> usize {
        self.ranked.first().map(|r| r.len()).unwrap_or(0)
    }

    /// The `rank`-th most probable bucket of every query.
    pub fn column(&self, rank: usize) -> Vec<Option<BucketId>> {
        self.ranked.iter().map(|r| r.get(rank).copied()).collect()
    }

    /// Most probable bucket of every query.
    pub fn top(&self) -> Vec<BucketId> {
        self.ranked
            .iter()
            .map(|r| r.first().copied().unwrap_or(0))
            .collect()
    }
}

/// Bucket ids ordered by descending score; stable, so ties keep id order.
pub(crate) fn rank_descending(scores: &[f32]) -> Vec<BucketId> {
    use ordered_float::OrderedFloat;
    use std::cmp::Reverse;

    let mut ids: Vec<BucketId> = (0..scores.len() as BucketId).collect();
    ids.sort_by_key(|&b| Reverse(OrderedFloat(scores[b as usize])));
    ids
}

/// A trained classifier predicting buckets for vectors.
pub trait RoutingModel: Send + Sync {
    /// Number of buckets the model ranks.
    fn num_buckets(&self) -> usize;

    /// Whether training has completed.
    fn is_trained(&self) -> bool;

    /// Ranked bucket distribution for every row of `vectors`.
    ///
    /// Fails with a not-trained error before training completes.
    fn predict_proba(&self, vectors: &DenseDataset) -> Result<BucketRanking>;

    /// Single most probable bucket per row.
    fn predict(&self, vectors: &DenseDataset) -> Result<Vec<BucketId>> {
        Ok(self.predict_proba(vectors)?.top())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_descending_stable_ties() {
        assert_eq!(rank_descending(&[0.1, 0.5, 0.1, 0.3]), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_ranking_columns() {
        let ranking = BucketRanking::from_probabilities(vec![
            vec![0.7, 0.2, 0.1],
            vec![0.1, 0.3, 0.6],
        ]);
        assert_eq!(ranking.width(), 3);
        assert_eq!(ranking.top(), vec![0, 2]);
        assert_eq!(ranking.column(1), vec![Some(1), Some(1)]);
        assert_eq!(ranking.column(3), vec![None, None]);
    }

    #[test]
    fn test_model_kind_serde() {
        let json = serde_json::to_string(&ModelKind::Linear).unwrap();
        assert_eq!(json, "\"linear\"");
    }
}
