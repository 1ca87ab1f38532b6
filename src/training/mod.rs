//! Training infrastructure for the Double-DQN acquisition agent.
//!
//! Provides the replay memory and the episode/validation/test loop.

pub mod buffer;
pub mod trainer;


pub use buffer::{ReplayBuffer, Transition};
pub use trainer::{EpisodeStats, StopReason, Trainer, TrainingReport};
