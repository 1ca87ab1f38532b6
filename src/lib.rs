//! feature_acquisition - budget-constrained feature acquisition with Double DQN
//!
//! An agent decides, one feature at a time, which measurements of an instance
//! to acquire before handing the partial observation to a classifier. The
//! problem is an episodic MDP: each query costs a step of a fixed budget, and
//! the terminal guess is rewarded with the classifier's confidence in the true
//! class. The agent is a Double-DQN learner with experience replay; the
//! classifier can be trained jointly inside the environment.
//!
//! Pure-Rust linear models are always available. MLP models backed by
//! `tch` are behind the `nn` feature flag.

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod environment;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod predictor;
pub mod qfunction;
pub mod reward;
pub mod schedule;
pub mod training;
pub mod types;

pub use agent::DoubleDqnAgent;
pub use checkpoint::CheckpointPaths;
pub use config::{EnvConfig, TrainingConfig};
pub use dataset::{Dataset, Partition, SplitConfig};
pub use environment::{
    EpisodeContext, EpisodeStatus, FeatureAcquisitionEnv, FlatMaskEncoder, RecurrentCellEncoder,
    StateEncoder, StepOutcome,
};
pub use error::{AcquisitionError, Result};
pub use evaluation::{evaluate, trace_episode, EpisodeTrace, TraceStep};
pub use metrics::{ConfusionMatrix, EvaluationReport};
pub use predictor::{FrozenPredictor, Predictor, SoftmaxRegression};
pub use qfunction::{LinearQFunction, QFunction};
pub use schedule::{epsilon_annealing, StepDecay};
pub use training::{ReplayBuffer, StopReason, Trainer, TrainingReport, Transition};
pub use types::{ActionMask, Mode};

/// Identifier type used for training runs.
pub type Id = String;

/// Generates a new unique identifier (UUID v4).
pub fn generate_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}
