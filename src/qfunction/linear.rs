//! Linear action-value model.

use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::QFunction;
use crate::error::{AcquisitionError, Result};
use crate::schedule::StepDecay;

/// `Q(s) = W s + b` with `W: n_actions × input_dim`, trained by SGD on MSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearQFunction {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    lr: StepDecay,
    weight_decay: f64,
}

impl LinearQFunction {
    /// Creates a zero-initialized model.
    pub fn new(input_dim: usize, n_actions: usize, lr: StepDecay, weight_decay: f64) -> Self {
        Self {
            weights: vec![vec![0.0; input_dim]; n_actions],
            bias: vec![0.0; n_actions],
            lr,
            weight_decay,
        }
    }

    /// Creates a model with weights drawn from `U(-1/√d, 1/√d)`.
    pub fn with_rng<R: Rng>(
        input_dim: usize,
        n_actions: usize,
        lr: StepDecay,
        weight_decay: f64,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (input_dim.max(1) as f64).sqrt();
        let mut model = Self::new(input_dim, n_actions, lr, weight_decay);
        for row in &mut model.weights {
            for w in row.iter_mut() {
                *w = rng.gen_range(-bound..bound);
            }
        }
        model
    }

    /// Builds a model from explicit parameters.
    pub fn from_parameters(
        weights: Vec<Vec<f64>>,
        bias: Vec<f64>,
        lr: StepDecay,
        weight_decay: f64,
    ) -> Result<Self> {
        if weights.len() != bias.len() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-function bias",
                expected: weights.len(),
                actual: bias.len(),
            });
        }
        let input_dim = weights.first().map(Vec::len).unwrap_or(0);
        if let Some(row) = weights.iter().find(|r| r.len() != input_dim) {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-function weight row",
                expected: input_dim,
                actual: row.len(),
            });
        }
        Ok(Self {
            weights,
            bias,
            lr,
            weight_decay,
        })
    }

    /// Current learning rate of the schedule.
    pub fn learning_rate(&self) -> f64 {
        self.lr.current()
    }

    fn row(&self, state: &[f64]) -> Result<Vec<f64>> {
        if state.len() != self.input_dim() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-function input",
                expected: self.input_dim(),
                actual: state.len(),
            });
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| w.iter().zip(state).map(|(w, s)| w * s).sum::<f64>() + b)
            .collect())
    }
}

impl QFunction for LinearQFunction {
    const CHECKPOINT_EXTENSION: &'static str = "json";

    fn input_dim(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn n_actions(&self) -> usize {
        self.bias.len()
    }

    fn forward<S: AsRef<[f64]>>(&self, states: &[S]) -> Result<Vec<Vec<f64>>> {
        states.iter().map(|s| self.row(s.as_ref())).collect()
    }

    fn train<S: AsRef<[f64]>>(&mut self, states: &[S], q_target: &[Vec<f64>]) -> Result<f64> {
        if states.len() != q_target.len() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-target batch",
                expected: states.len(),
                actual: q_target.len(),
            });
        }
        if states.is_empty() {
            return Ok(0.0);
        }
        let q_pred = self.forward(states)?;
        let n_actions = self.n_actions();
        let n_elements = (states.len() * n_actions) as f64;

        let mut loss = 0.0;
        let mut grad_w = vec![vec![0.0; self.input_dim()]; n_actions];
        let mut grad_b = vec![0.0; n_actions];
        for ((state, pred), target) in states.iter().zip(&q_pred).zip(q_target) {
            if target.len() != n_actions {
                return Err(AcquisitionError::DimensionMismatch {
                    what: "q-target row",
                    expected: n_actions,
                    actual: target.len(),
                });
            }
            for a in 0..n_actions {
                let diff = pred[a] - target[a];
                loss += diff * diff;
                if diff == 0.0 {
                    continue;
                }
                let g = 2.0 * diff / n_elements;
                for (gw, s) in grad_w[a].iter_mut().zip(state.as_ref()) {
                    *gw += g * s;
                }
                grad_b[a] += g;
            }
        }

        let lr = self.lr.current();
        for (a, row) in self.weights.iter_mut().enumerate() {
            for (w, gw) in row.iter_mut().zip(&grad_w[a]) {
                *w -= lr * (gw + self.weight_decay * *w);
            }
            self.bias[a] -= lr * grad_b[a];
        }
        Ok(loss / n_elements)
    }

    fn copy_from(&mut self, other: &Self) -> Result<()> {
        if other.input_dim() != self.input_dim() || other.n_actions() != self.n_actions() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-function parameters",
                expected: self.input_dim() * self.n_actions(),
                actual: other.input_dim() * other.n_actions(),
            });
        }
        self.weights.clone_from(&other.weights);
        self.bias.clone_from(&other.bias);
        Ok(())
    }

    fn anneal_learning_rate(&mut self) {
        self.lr.advance();
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
        self.copy_from(&loaded)?;
        self.lr = loaded.lr;
        Ok(())
    }
}
