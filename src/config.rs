//! Configuration for the acquisition environment and the training loop.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, Result};
use crate::schedule::StepDecay;

/// Environment-side settings, projected from [`TrainingConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Step budget per episode.
    pub episode_length: usize,
    /// Whether training episodes give the predictor an online update.
    pub train_predictor: bool,
    /// Upper bound of the uniform reward paid for a query step.
    pub reward_noise_scale: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        TrainingConfig::default().env_config()
    }
}

/// Flat hyperparameter record for a full training run.
///
/// Every field has a default, so a partial JSON file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // --- Persistence ---
    /// Directory for `best_guesser.*` / `best_dqn.*`.
    pub save_dir: PathBuf,
    /// Also keep `{episode}_{net}_{acc}` copies on every improvement.
    pub save_episode_checkpoints: bool,

    // --- Q-learning ---
    /// Discount rate for the bootstrapped target.
    pub gamma: f64,
    /// Episodes between hard target-network syncs.
    pub n_update_target: usize,
    pub batch_size: usize,
    /// Replay memory capacity.
    pub capacity: usize,
    /// Hidden width of the action-value network.
    pub hidden_dim: usize,
    pub lr: f64,
    pub weight_decay: f64,

    // --- Exploration ---
    /// Episode at which ε reaches `min_eps`.
    pub max_episode: usize,
    pub min_eps: f64,

    // --- Validation / stopping ---
    /// Episodes between validation passes.
    pub val_interval: usize,
    /// Training stops after `patience / 2` non-improving validations.
    pub patience: usize,
    /// Hard cap on training episodes, if any.
    pub max_episodes: Option<usize>,

    // --- Environment ---
    pub episode_length: usize,
    pub train_predictor: bool,
    pub reward_noise_scale: f64,

    // --- Predictor ---
    pub predictor_hidden_dim: usize,
    pub predictor_lr: f64,
    pub predictor_weight_decay: f64,

    // --- Learning-rate decay (shared by both networks) ---
    pub lr_decay_factor: f64,
    pub lr_decay_step: u64,
    pub min_lr: f64,

    /// Seed for environment, agent and replay sampling.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("ddqn_models"),
            save_episode_checkpoints: false,
            gamma: 0.85,
            n_update_target: 10,
            batch_size: 64,
            capacity: 10_000,
            hidden_dim: 64,
            lr: 1e-4,
            weight_decay: 0.0,
            max_episode: 2000,
            min_eps: 0.01,
            val_interval: 1000,
            patience: 100,
            max_episodes: None,
            episode_length: 7,
            train_predictor: false,
            reward_noise_scale: 0.01,
            predictor_hidden_dim: 256,
            predictor_lr: 1e-4,
            predictor_weight_decay: 0.0,
            lr_decay_factor: 0.1,
            lr_decay_step: 12_500,
            min_lr: 1e-6,
            seed: 0,
        }
    }
}

impl TrainingConfig {
    /// Loads a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| AcquisitionError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(AcquisitionError::InvalidConfig(msg.to_string()));
        if self.episode_length == 0 {
            return invalid("episode_length must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if self.capacity <= self.batch_size {
            return invalid("capacity must exceed batch_size");
        }
        if self.n_update_target == 0 || self.val_interval == 0 {
            return invalid("n_update_target and val_interval must be positive");
        }
        if self.patience < 2 {
            return invalid("patience must be at least 2");
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid("gamma must lie in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.min_eps) {
            return invalid("min_eps must lie in [0, 1]");
        }
        if self.lr <= 0.0 || self.predictor_lr <= 0.0 {
            return invalid("learning rates must be positive");
        }
        if self.reward_noise_scale < 0.0 {
            return invalid("reward_noise_scale must be non-negative");
        }
        Ok(())
    }

    /// Episode settings for the environment.
    pub fn env_config(&self) -> EnvConfig {
        EnvConfig {
            episode_length: self.episode_length,
            train_predictor: self.train_predictor,
            reward_noise_scale: self.reward_noise_scale,
        }
    }

    /// Learning-rate schedule for the action-value network.
    pub fn agent_lr_schedule(&self) -> StepDecay {
        StepDecay::new(self.lr, self.lr_decay_factor, self.lr_decay_step, self.min_lr)
    }

    /// Learning-rate schedule for the predictor.
    pub fn predictor_lr_schedule(&self) -> StepDecay {
        StepDecay::new(
            self.predictor_lr,
            self.lr_decay_factor,
            self.lr_decay_step,
            self.min_lr,
        )
    }

    /// Stop threshold on consecutive non-improving validations.
    pub fn stop_after(&self) -> usize {
        self.patience / 2
    }
}
