//! Episode loop with periodic validation, early stopping and a final test pass.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::buffer::{ReplayBuffer, Transition};
use crate::agent::DoubleDqnAgent;
use crate::checkpoint::{load_if_present, save_atomic, save_pair_atomic, CheckpointPaths};
use crate::config::TrainingConfig;
use crate::environment::{FeatureAcquisitionEnv, FlatMaskEncoder, StateEncoder};
use crate::error::{AcquisitionError, Result};
use crate::evaluation::evaluate;
use crate::metrics::EvaluationReport;
use crate::predictor::Predictor;
use crate::qfunction::QFunction;
use crate::schedule::epsilon_annealing;
use crate::types::Mode;
use crate::{generate_id, Id};

/// Episodes covered by the rolling reward/step statistics.
const RECENT_WINDOW: usize = 100;

/// Statistics of one training episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    /// Sum of rewards over the episode.
    pub reward: f64,
    pub steps: usize,
    /// Mean Double-DQN loss over the episode's updates, if any ran.
    pub mean_loss: Option<f64>,
}

/// Why the training loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Validation accuracy stopped improving.
    Patience,
    /// `max_episodes` was reached.
    EpisodeLimit,
    /// The stop flag was raised.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Patience => write!(f, "patience exhausted"),
            StopReason::EpisodeLimit => write!(f, "episode limit"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Summary of a full training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub run_id: Id,
    /// Training episodes played.
    pub episodes: usize,
    pub best_val_accuracy: f64,
    pub stop_reason: StopReason,
    /// Mean episode reward over the last episodes played.
    pub mean_recent_reward: f64,
    /// Mean episode length over the last episodes played.
    pub mean_recent_steps: f64,
    /// Test pass on this run's best checkpoints, or on the final parameters
    /// when none were saved.
    pub test: EvaluationReport,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Training run {} ===", self.run_id)?;
        writeln!(f, "  Episodes:               {}", self.episodes)?;
        writeln!(f, "  Stopped by:             {}", self.stop_reason)?;
        writeln!(f, "  Best val accuracy:      {:.4}", self.best_val_accuracy)?;
        writeln!(f, "  Recent mean reward:     {:.4}", self.mean_recent_reward)?;
        writeln!(f, "  Recent mean steps:      {:.2}", self.mean_recent_steps)?;
        write!(f, "{}", self.test)
    }
}

/// Drives the environment and agent through training episodes.
///
/// Each episode runs to termination before the next begins. Every
/// `val_interval` episodes a greedy validation pass decides whether the
/// current networks become the new best checkpoint; every `n_update_target`
/// episodes the target network is synced. After stopping, the best
/// checkpoints are reloaded and scored on the test partition.
pub struct Trainer<P, Q, E = FlatMaskEncoder> {
    env: FeatureAcquisitionEnv<P, E>,
    agent: DoubleDqnAgent<Q>,
    memory: ReplayBuffer,
    config: TrainingConfig,
    checkpoints: CheckpointPaths,
    rng: StdRng,
    stop_flag: Option<Arc<AtomicBool>>,
    run_id: Id,
}

impl<P, Q, E> Trainer<P, Q, E>
where
    P: Predictor,
    Q: QFunction,
    E: StateEncoder,
{
    /// Creates a trainer; fails if the config is invalid or the agent's
    /// shape does not match the environment.
    pub fn new(
        env: FeatureAcquisitionEnv<P, E>,
        agent: DoubleDqnAgent<Q>,
        config: TrainingConfig,
    ) -> Result<Self> {
        config.validate()?;
        if agent.online().input_dim() != env.state_dim() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-function input",
                expected: env.state_dim(),
                actual: agent.online().input_dim(),
            });
        }
        if agent.online().n_actions() != env.n_actions() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-function actions",
                expected: env.n_actions(),
                actual: agent.online().n_actions(),
            });
        }
        Ok(Self {
            env,
            agent,
            memory: ReplayBuffer::new(config.capacity),
            checkpoints: CheckpointPaths::new(&config.save_dir),
            rng: StdRng::seed_from_u64(config.seed),
            stop_flag: None,
            run_id: generate_id(),
            config,
        })
    }

    /// Installs a flag that ends training at the next episode boundary.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Identifier attached to this run's log span and report.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The environment being trained in.
    pub fn env(&self) -> &FeatureAcquisitionEnv<P, E> {
        &self.env
    }

    /// Mutable access to the environment.
    pub fn env_mut(&mut self) -> &mut FeatureAcquisitionEnv<P, E> {
        &mut self.env
    }

    /// The agent being trained.
    pub fn agent(&self) -> &DoubleDqnAgent<Q> {
        &self.agent
    }

    /// Mutable access to the agent.
    pub fn agent_mut(&mut self) -> &mut DoubleDqnAgent<Q> {
        &mut self.agent
    }

    /// The replay memory filled by `play_episode`.
    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    /// The validated training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Where this trainer writes its checkpoints.
    pub fn checkpoints(&self) -> &CheckpointPaths {
        &self.checkpoints
    }

    /// Consumes the trainer and returns the environment and agent.
    pub fn into_parts(self) -> (FeatureAcquisitionEnv<P, E>, DoubleDqnAgent<Q>) {
        (self.env, self.agent)
    }

    fn cancelled(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Plays one training episode with exploration rate `epsilon`.
    ///
    /// Every step is pushed to replay memory; once the memory holds more than
    /// one batch, each step also runs one Double-DQN update. The online
    /// learning rate is annealed once at the end.
    pub fn play_episode(&mut self, epsilon: f64) -> Result<EpisodeStats> {
        let mut ctx = self.env.reset(Mode::Training, 0)?;
        let mut total_reward = 0.0;
        let mut loss_sum = 0.0;
        let mut updates = 0usize;

        while !ctx.is_done() {
            let state = ctx.state().to_vec();
            let action = self
                .agent
                .select_action(&state, epsilon, ctx.mask(), Mode::Training)?;
            let outcome = self.env.step(&mut ctx, action)?;
            let reward = outcome.reward.unwrap_or(0.0);
            total_reward += reward;

            self.memory.push(Transition {
                state,
                action,
                reward,
                next_state: outcome.state,
                done: outcome.done,
            });

            if self.memory.len() > self.config.batch_size {
                let batch = self.memory.sample(self.config.batch_size, &mut self.rng);
                loss_sum += self.agent.train_step(&batch, self.config.gamma)?;
                updates += 1;
            }
        }
        self.agent.anneal_learning_rate();

        Ok(EpisodeStats {
            reward: total_reward,
            steps: ctx.steps(),
            mean_loss: (updates > 0).then(|| loss_sum / updates as f64),
        })
    }

    /// Greedy pass over the validation partition.
    pub fn validate(&mut self) -> Result<EvaluationReport> {
        evaluate(&mut self.env, &mut self.agent, Mode::Validation)
    }

    /// Greedy pass over the test partition with the current parameters.
    pub fn test(&mut self) -> Result<EvaluationReport> {
        evaluate(&mut self.env, &mut self.agent, Mode::Test)
    }

    /// Runs the full loop: training episodes, validation and early stopping,
    /// then a test pass on the best checkpoints of this run.
    pub fn train(&mut self) -> Result<TrainingReport> {
        let span = tracing::info_span!("train", run_id = %self.run_id);
        let _enter = span.enter();

        self.checkpoints.ensure_dir()?;
        tracing::info!(
            save_dir = %self.checkpoints.dir().display(),
            n_features = self.env.n_features(),
            train_size = self.env.dataset().train.len(),
            "training started"
        );

        let stop_after = self.config.stop_after();
        let mut best_accuracy = 0.0;
        let mut non_improving = 0;
        let mut recent_rewards = VecDeque::with_capacity(RECENT_WINDOW);
        let mut recent_steps = VecDeque::with_capacity(RECENT_WINDOW);
        let mut episode = 0;
        let mut saved = false;

        let stop_reason = loop {
            if self.cancelled() {
                break StopReason::Cancelled;
            }
            if self.config.max_episodes.is_some_and(|limit| episode >= limit) {
                break StopReason::EpisodeLimit;
            }
            episode += 1;

            let epsilon =
                epsilon_annealing(episode, self.config.max_episode, self.config.min_eps);
            let stats = self.play_episode(epsilon)?;
            push_recent(&mut recent_rewards, stats.reward);
            push_recent(&mut recent_steps, stats.steps as f64);
            tracing::debug!(
                episode,
                epsilon,
                reward = stats.reward,
                steps = stats.steps,
                loss = ?stats.mean_loss,
                "episode finished"
            );

            if episode % self.config.val_interval == 0 {
                let report = self.validate()?;
                tracing::info!(
                    episode,
                    accuracy = report.accuracy,
                    best = best_accuracy,
                    average_steps = report.average_steps,
                    "validation pass"
                );
                if report.accuracy > best_accuracy {
                    best_accuracy = report.accuracy;
                    non_improving = 0;
                    self.save_best(episode, report.accuracy)?;
                    saved = true;
                } else {
                    non_improving += 1;
                }
                if non_improving >= stop_after {
                    tracing::info!(episode, non_improving, "early stopping");
                    break StopReason::Patience;
                }
            }

            if episode % self.config.n_update_target == 0 {
                self.agent.sync_target()?;
                tracing::debug!(episode, "target network synced");
            }
        };

        if saved {
            self.restore_best()?;
        } else {
            tracing::info!("no checkpoint saved during this run, testing current parameters");
        }
        let test = self.test()?;
        tracing::info!(
            accuracy = test.accuracy,
            average_steps = test.average_steps,
            forced_guesses = test.forced_guesses,
            "test pass"
        );

        Ok(TrainingReport {
            run_id: self.run_id.clone(),
            episodes: episode,
            best_val_accuracy: best_accuracy,
            stop_reason,
            mean_recent_reward: mean(&recent_rewards),
            mean_recent_steps: mean(&recent_steps),
            test,
        })
    }

    /// Writes the current predictor and online network as the best pair.
    ///
    /// Both files are staged before either is renamed into place, so a failed
    /// write leaves the previous pair untouched.
    pub fn save_best(&self, episode: usize, accuracy: f64) -> Result<()> {
        let predictor = self.env.predictor();
        let online = self.agent.online();

        save_pair_atomic(
            &self.checkpoints.guesser::<P>(),
            |tmp| predictor.save(tmp),
            &self.checkpoints.dqn::<Q>(),
            |tmp| online.save(tmp),
        )?;
        if self.config.save_episode_checkpoints {
            save_atomic(
                &self.checkpoints.tagged_guesser::<P>(episode, accuracy),
                |tmp| predictor.save(tmp),
            )?;
            save_atomic(&self.checkpoints.tagged_dqn::<Q>(episode, accuracy), |tmp| {
                online.save(tmp)
            })?;
        }
        tracing::info!(episode, accuracy, "new best checkpoint saved");
        Ok(())
    }

    /// Reloads the best pair, keeping current parameters for missing files,
    /// and re-syncs the target network.
    pub fn restore_best(&mut self) -> Result<()> {
        let guesser = self.checkpoints.guesser::<P>();
        let dqn = self.checkpoints.dqn::<Q>();
        let env = &mut self.env;
        load_if_present(&guesser, |path| env.predictor_mut().load(path))?;
        let agent = &mut self.agent;
        load_if_present(&dqn, |path| agent.online_mut().load(path))?;
        self.agent.sync_target()
    }
}

fn push_recent(window: &mut VecDeque<f64>, value: f64) {
    if window.len() == RECENT_WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

fn mean(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
