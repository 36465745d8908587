//! Mini-batch training loop for routing models.

use super::mlp::{to_matrix, MlpClassifier};
use super::ModelKind;
use crate::data_format::DenseDataset;
use crate::error::{IndexError, Result};
use crate::types::BucketId;
use crate::utils::RandomSampler;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Options for one training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    /// Passes over the training set.
    pub epochs: usize,

    /// SGD learning rate.
    pub learning_rate: f32,

    /// Rows per mini-batch.
    pub batch_size: usize,

    /// Hidden layer width (ignored by [`ModelKind::Linear`]).
    pub hidden_dim: usize,

    /// Seed for weight init and batch order.
    pub seed: u64,
}

/// Summary of a finished training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Mean loss of the final epoch (0 when no epochs ran).
    pub final_loss: f32,

    /// Epochs completed.
    pub epochs: usize,

    /// Wall time spent training.
    pub elapsed: Duration,
}

/// Train a classifier mapping `points` to `labels` over `num_buckets` classes.
///
/// Each epoch visits every point once in a freshly shuffled order.
pub fn fit_router(
    kind: ModelKind,
    points: &DenseDataset,
    labels: &[BucketId],
    num_buckets: usize,
    config: &TrainingConfig,
) -> Result<(MlpClassifier, TrainingReport)> {
    if points.size() != labels.len() {
        return Err(IndexError::invalid_argument(format!(
            "{} points but {} labels",
            points.size(),
            labels.len()
        )));
    }

    let start = Instant::now();
    let mut sampler = RandomSampler::with_seed(config.seed);
    let mut model = MlpClassifier::new(kind, points.dimensionality(), config.hidden_dim, num_buckets);
    model.initialize(&mut sampler)?;

    let mut final_loss = 0.0f32;
    for epoch in 0..config.epochs {
        let mut epoch_loss = 0.0f32;
        let mut seen = 0usize;
        for batch in sampler.epoch_batches(points.size(), config.batch_size) {
            let x = to_matrix(points, &batch);
            let y: Vec<usize> = batch.iter().map(|&i| labels[i] as usize).collect();
            let loss = model.train_batch(&x, &y, config.learning_rate)?;
            epoch_loss += loss * batch.len() as f32;
            seen += batch.len();
        }
        final_loss = if seen > 0 { epoch_loss / seen as f32 } else { 0.0 };
        trace!(epoch, loss = final_loss, "epoch finished");
    }

    let report = TrainingReport {
        final_loss,
        epochs: config.epochs,
        elapsed: start.elapsed(),
    };
    debug!(
        model = kind.name(),
        points = points.size(),
        buckets = num_buckets,
        loss = report.final_loss,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "trained router"
    );
    Ok((model, report))
}
