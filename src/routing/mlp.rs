//! Softmax classifier used as the bucket router.
//!
//! Weights are stored as `nalgebra` matrices in row-major batch convention:
//! a batch `X` is `B x D`, a layer maps it as `X * W + b`.

use super::{BucketRanking, ModelKind, RoutingModel};
use crate::data_format::DenseDataset;
use crate::error::{IndexError, Result};
use crate::utils::RandomSampler;
use nalgebra::{DMatrix, RowDVector};
use rand_distr::{Distribution, Normal};

/// Rows per forward pass during inference.
const PREDICT_CHUNK: usize = 4096;

#[derive(Debug, Clone)]
struct Layer {
    weights: DMatrix<f32>,
    bias: RowDVector<f32>,
}

impl Layer {
    /// He-style normal init scaled by fan-in.
    fn init(fan_in: usize, fan_out: usize, sampler: &mut RandomSampler) -> Result<Self> {
        let std = (2.0 / fan_in.max(1) as f32).sqrt();
        let normal = Normal::new(0.0f32, std)
            .map_err(|e| IndexError::internal(format!("weight init: {e}")))?;
        let rng = sampler.rng_mut();
        let weights = DMatrix::from_fn(fan_in, fan_out, |_, _| normal.sample(&mut *rng));
        Ok(Self {
            weights,
            bias: RowDVector::zeros(fan_out),
        })
    }

    fn forward(&self, input: &DMatrix<f32>) -> DMatrix<f32> {
        let mut out = input * &self.weights;
        for mut row in out.row_iter_mut() {
            row += &self.bias;
        }
        out
    }

    fn step(&mut self, grad_w: &DMatrix<f32>, grad_b: &RowDVector<f32>, lr: f32) {
        self.weights -= grad_w * lr;
        self.bias -= grad_b * lr;
    }
}

#[derive(Debug, Clone)]
struct Weights {
    hidden: Option<Layer>,
    output: Layer,
}

/// Feed-forward softmax classifier over buckets.
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    kind: ModelKind,
    input_dim: usize,
    hidden_dim: usize,
    output_dim: usize,
    weights: Option<Weights>,
}

impl MlpClassifier {
    /// Create an untrained classifier.
    pub fn new(kind: ModelKind, input_dim: usize, hidden_dim: usize, output_dim: usize) -> Self {
        Self {
            kind,
            input_dim,
            hidden_dim,
            output_dim: output_dim.max(1),
            weights: None,
        }
    }

    /// Architecture of this classifier.
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Input dimensionality.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Initialize weights from the sampler. Called once before the first batch.
    pub(crate) fn initialize(&mut self, sampler: &mut RandomSampler) -> Result<()> {
        let weights = match self.kind {
            ModelKind::Mlp => Weights {
                hidden: Some(Layer::init(self.input_dim, self.hidden_dim, sampler)?),
                output: Layer::init(self.hidden_dim, self.output_dim, sampler)?,
            },
            ModelKind::Linear => Weights {
                hidden: None,
                output: Layer::init(self.input_dim, self.output_dim, sampler)?,
            },
        };
        self.weights = Some(weights);
        Ok(())
    }

    /// One SGD step on a mini-batch. Returns the mean cross-entropy loss.
    pub(crate) fn train_batch(&mut self, batch: &DMatrix<f32>, labels: &[usize], lr: f32) -> Result<f32> {
        let output_dim = self.output_dim;
        let weights = self
            .weights
            .as_mut()
            .ok_or_else(|| IndexError::not_trained("classifier weights are not initialized"))?;
        let batch_size = batch.nrows();
        if batch_size == 0 {
            return Ok(0.0);
        }

        // Forward
        let (hidden_pre, hidden_act) = match &weights.hidden {
            Some(layer) => {
                let pre = layer.forward(batch);
                let act = pre.map(|v| v.max(0.0));
                (Some(pre), Some(act))
            }
            None => (None, None),
        };
        let output_input = hidden_act.as_ref().unwrap_or(batch);
        let mut probs = weights.output.forward(output_input);
        softmax_rows(&mut probs);

        let mut loss = 0.0f32;
        for (i, &label) in labels.iter().enumerate() {
            if label >= output_dim {
                return Err(IndexError::out_of_range(format!(
                    "label {label} outside {output_dim} buckets"
                )));
            }
            loss -= probs[(i, label)].max(1e-12).ln();
        }
        loss /= batch_size as f32;

        // Backward: d(loss)/d(logits) = (P - Y) / B
        let mut grad_logits = probs;
        for (i, &label) in labels.iter().enumerate() {
            grad_logits[(i, label)] -= 1.0;
        }
        grad_logits /= batch_size as f32;

        let grad_out_w = output_input.transpose() * &grad_logits;
        let grad_out_b = grad_logits.row_sum();

        if let (Some(layer), Some(pre)) = (weights.hidden.as_mut(), hidden_pre) {
            let mut grad_hidden = &grad_logits * weights.output.weights.transpose();
            grad_hidden.zip_apply(&pre, |g, z| {
                if z <= 0.0 {
                    *g = 0.0;
                }
            });
            let grad_hidden_w = batch.transpose() * &grad_hidden;
            let grad_hidden_b = grad_hidden.row_sum();
            layer.step(&grad_hidden_w, &grad_hidden_b, lr);
        }
        weights.output.step(&grad_out_w, &grad_out_b, lr);

        Ok(loss)
    }

    fn forward_probabilities(&self, weights: &Weights, batch: &DMatrix<f32>) -> DMatrix<f32> {
        let logits = match &weights.hidden {
            Some(layer) => {
                let act = layer.forward(batch).map(|v| v.max(0.0));
                weights.output.forward(&act)
            }
            None => weights.output.forward(batch),
        };
        let mut probs = logits;
        softmax_rows(&mut probs);
        probs
    }
}

impl RoutingModel for MlpClassifier {
    fn num_buckets(&self) -> usize {
        self.output_dim
    }

    fn is_trained(&self) -> bool {
        self.weights.is_some()
    }

    fn predict_proba(&self, vectors: &DenseDataset) -> Result<BucketRanking> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| IndexError::not_trained("Model is not trained, call `build` first"))?;
        if vectors.is_empty() {
            return Ok(BucketRanking::from_probabilities(Vec::new()));
        }
        if vectors.dimensionality() != self.input_dim {
            return Err(IndexError::invalid_argument(format!(
                "query dimensionality {} does not match model input {}",
                vectors.dimensionality(),
                self.input_dim
            )));
        }

        let positions: Vec<usize> = (0..vectors.size()).collect();
        let mut probabilities = Vec::with_capacity(vectors.size());
        for chunk in positions.chunks(PREDICT_CHUNK) {
            let batch = to_matrix(vectors, chunk);
            let probs = self.forward_probabilities(weights, &batch);
            probabilities.extend(probs.row_iter().map(|r| r.iter().copied().collect::<Vec<f32>>()));
        }
        Ok(BucketRanking::from_probabilities(probabilities))
    }
}

/// Copy selected rows into a `len x dim` matrix.
pub(crate) fn to_matrix(vectors: &DenseDataset, positions: &[usize]) -> DMatrix<f32> {
    let dim = vectors.dimensionality();
    let mut flat = Vec::with_capacity(positions.len() * dim);
    for &p in positions {
        flat.extend_from_slice(vectors.row(p));
    }
    DMatrix::from_row_slice(positions.len(), dim, &flat)
}

/// Numerically stable in-place softmax over each row.
fn softmax_rows(m: &mut DMatrix<f32>) {
    for mut row in m.row_iter_mut() {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        if sum > 0.0 {
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
    }
}
