//! Predictor capability: acquired-feature encoding → class distribution.
//!
//! The environment calls the predictor to score guesses and, in training
//! mode, to take online supervised steps. Implementations:
//!
//! - [`SoftmaxRegression`]: pure-Rust multinomial logistic regression.
//! - [`MlpPredictor`] (feature `nn`): tch-backed MLP.
//! - [`FrozenPredictor`]: wraps any predictor and ignores updates.

pub mod linear;
#[cfg(feature = "nn")]
pub mod network;
pub mod pretrain;

use std::path::Path;

use crate::error::Result;

pub use linear::SoftmaxRegression;
#[cfg(feature = "nn")]
pub use network::MlpPredictor;
pub use pretrain::{pretrain_predictor, PretrainConfig, PretrainReport};

/// A probabilistic classifier trained online from inside the environment.
pub trait Predictor {
    /// File extension of checkpoints written by [`Predictor::save`].
    const CHECKPOINT_EXTENSION: &'static str;

    /// Width of the input vector.
    fn input_dim(&self) -> usize;

    fn n_classes(&self) -> usize;

    /// Class probabilities for one input vector. Sums to 1.
    fn forward(&self, input: &[f64]) -> Result<Vec<f64>>;

    /// One supervised gradient step toward `label`; returns the loss.
    fn update(&mut self, input: &[f64], label: usize) -> Result<f64>;

    /// Advances the learning-rate schedule by one tick.
    fn anneal_learning_rate(&mut self);

    /// Switches regularization layers between train and eval behavior.
    fn set_training_mode(&mut self, training: bool);

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Predictor whose parameters never move.
///
/// Forward passes and persistence go to the wrapped predictor; updates and
/// learning-rate ticks are dropped. Makes the reward function stationary.
#[derive(Debug, Clone)]
pub struct FrozenPredictor<P> {
    inner: P,
}

impl<P: Predictor> FrozenPredictor<P> {
    /// Wraps `inner`; updates become no-ops.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// Returns the wrapped predictor.
    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: Predictor> Predictor for FrozenPredictor<P> {
    const CHECKPOINT_EXTENSION: &'static str = P::CHECKPOINT_EXTENSION;

    fn input_dim(&self) -> usize {
        self.inner.input_dim()
    }

    fn n_classes(&self) -> usize {
        self.inner.n_classes()
    }

    fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.inner.forward(input)
    }

    fn update(&mut self, _input: &[f64], _label: usize) -> Result<f64> {
        Ok(0.0)
    }

    fn anneal_learning_rate(&mut self) {}

    fn set_training_mode(&mut self, training: bool) {
        self.inner.set_training_mode(training);
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.inner.save(path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.inner.load(path)
    }
}

/// Index of the largest probability; ties resolve to the lowest class.
pub fn argmax(probabilities: &[f64]) -> usize {
    probabilities
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_p), (i, &p)| {
            if p > best_p {
                (i, p)
            } else {
                (best, best_p)
            }
        })
        .0
}
