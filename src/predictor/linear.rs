//! Multinomial logistic regression predictor.

use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Predictor;
use crate::error::{AcquisitionError, Result};
use crate::schedule::StepDecay;

/// Linear softmax classifier trained by SGD on cross-entropy.
///
/// `p = softmax(W x + b)` with `W: n_classes × input_dim`. Checkpoints are
/// JSON documents holding the weights and the learning-rate schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    lr: StepDecay,
    weight_decay: f64,
    #[serde(skip)]
    training: bool,
}

impl SoftmaxRegression {
    /// Creates a zero-initialized classifier (uniform output).
    pub fn new(input_dim: usize, n_classes: usize, lr: StepDecay, weight_decay: f64) -> Self {
        Self {
            weights: vec![vec![0.0; input_dim]; n_classes],
            bias: vec![0.0; n_classes],
            lr,
            weight_decay,
            training: false,
        }
    }

    /// Creates a classifier with weights drawn from `U(-1/√d, 1/√d)`.
    pub fn with_rng<R: Rng>(
        input_dim: usize,
        n_classes: usize,
        lr: StepDecay,
        weight_decay: f64,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (input_dim.max(1) as f64).sqrt();
        let mut model = Self::new(input_dim, n_classes, lr, weight_decay);
        for row in &mut model.weights {
            for w in row.iter_mut() {
                *w = rng.gen_range(-bound..bound);
            }
        }
        model
    }

    /// Current learning rate of the schedule.
    pub fn learning_rate(&self) -> f64 {
        self.lr.current()
    }

    /// Returns `true` while in training mode.
    pub fn is_training(&self) -> bool {
        self.training
    }

    fn logits(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }

    fn check_input(&self, input: &[f64]) -> Result<()> {
        if input.len() != self.input_dim() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "predictor input",
                expected: self.input_dim(),
                actual: input.len(),
            });
        }
        Ok(())
    }
}

/// Numerically stable softmax.
pub(crate) fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

impl Predictor for SoftmaxRegression {
    const CHECKPOINT_EXTENSION: &'static str = "json";

    fn input_dim(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn n_classes(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.check_input(input)?;
        Ok(softmax(&self.logits(input)))
    }

    fn update(&mut self, input: &[f64], label: usize) -> Result<f64> {
        self.check_input(input)?;
        if label >= self.n_classes() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "class label",
                expected: self.n_classes(),
                actual: label,
            });
        }
        let probs = softmax(&self.logits(input));
        let loss = -probs[label].max(f64::MIN_POSITIVE).ln();
        let lr = self.lr.current();

        for (c, (row, b)) in self.weights.iter_mut().zip(self.bias.iter_mut()).enumerate() {
            let grad = probs[c] - if c == label { 1.0 } else { 0.0 };
            for (w, x) in row.iter_mut().zip(input) {
                *w -= lr * (grad * x + self.weight_decay * *w);
            }
            *b -= lr * grad;
        }
        Ok(loss)
    }

    fn anneal_learning_rate(&mut self) {
        self.lr.advance();
    }

    fn set_training_mode(&mut self, training: bool) {
        self.training = training;
    }

    fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        fs::write(path, bytes).map_err(|source| AcquisitionError::CheckpointWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let bytes = fs::read(path).map_err(|source| AcquisitionError::CheckpointRead {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded: Self = serde_json::from_slice(&bytes)?;
        if loaded.input_dim() != self.input_dim() || loaded.n_classes() != self.n_classes() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "predictor checkpoint",
                expected: self.input_dim() * self.n_classes(),
                actual: loaded.input_dim() * loaded.n_classes(),
            });
        }
        let training = self.training;
        *self = loaded;
        self.training = training;
        Ok(())
    }
}
