//! Action-value function capability used by the Double-DQN agent.
//!
//! Implementations:
//!
//! - [`LinearQFunction`]: pure-Rust linear model trained by SGD.
//! - [`MlpQFunction`] (feature `nn`): tch-backed MLP trained with Adam.

pub mod linear;
#[cfg(feature = "nn")]
pub mod network;

use std::path::Path;

use crate::error::Result;

pub use linear::LinearQFunction;
#[cfg(feature = "nn")]
pub use network::MlpQFunction;

/// Maps a batch of states to one Q-value per action.
pub trait QFunction {
    /// File extension of checkpoints written by [`QFunction::save`].
    const CHECKPOINT_EXTENSION: &'static str;

    fn input_dim(&self) -> usize;

    fn n_actions(&self) -> usize;

    /// Q-values, one row of `n_actions` per input state.
    fn forward<S: AsRef<[f64]>>(&self, states: &[S]) -> Result<Vec<Vec<f64>>>;

    /// One gradient step on the mean-squared error between
    /// `forward(states)` and `q_target`; returns the loss before the step.
    fn train<S: AsRef<[f64]>>(&mut self, states: &[S], q_target: &[Vec<f64>]) -> Result<f64>;

    /// Hard-copies every parameter of `other` into `self`.
    fn copy_from(&mut self, other: &Self) -> Result<()>;

    /// Advances the learning-rate schedule by one tick.
    fn anneal_learning_rate(&mut self);

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;
}
