//! Feature-acquisition environment.
//!
//! An episode reveals features of one instance, one per step, until the agent
//! takes the guess action or the step budget runs out:
//!
//! 1. [`FeatureAcquisitionEnv::reset`] picks an instance and returns a fresh
//!    [`EpisodeContext`].
//! 2. [`FeatureAcquisitionEnv::step`] applies a query or guess to that context.
//! 3. [`FeatureAcquisitionEnv::force_guess`] ends a budget-exhausted episode
//!    with a guess during evaluation.
//!
//! All episode-scoped state lives in the context value, so the environment
//! itself only holds the dataset, the predictor, the encoder and the RNG.

pub mod encoder;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::EnvConfig;
use crate::dataset::Dataset;
use crate::error::{AcquisitionError, Result};
use crate::predictor::{argmax, Predictor};
use crate::reward::RewardComputer;
use crate::types::{ActionMask, Mode};

pub use encoder::{EncodedState, FlatMaskEncoder, RecurrentCellEncoder, StateEncoder};

/// Lifecycle of one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStatus {
    Active,
    /// Step budget reached without a guess.
    BudgetExhausted,
    /// The guess action was taken.
    Guessed { class: usize },
}

/// Everything that belongs to a single episode.
#[derive(Debug, Clone)]
pub struct EpisodeContext {
    mode: Mode,
    instance: usize,
    label: usize,
    encoded: EncodedState,
    mask: ActionMask,
    steps: usize,
    status: EpisodeStatus,
    train_predictor: bool,
    probabilities: Option<Vec<f64>>,
}

impl EpisodeContext {
    /// Current observation.
    pub fn state(&self) -> &[f64] {
        &self.encoded.observation
    }

    /// Actions still available in this episode.
    pub fn mask(&self) -> &ActionMask {
        &self.mask
    }

    /// The partition this episode draws from.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Index of the instance within its partition.
    pub fn instance(&self) -> usize {
        self.instance
    }

    /// True class of the instance.
    pub fn label(&self) -> usize {
        self.label
    }

    /// Number of `step`/`force_guess` calls so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Whether the episode is running, out of budget or guessed.
    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    /// Returns `true` once the episode has terminated.
    pub fn is_done(&self) -> bool {
        self.status != EpisodeStatus::Active
    }

    /// The guessed class, if a guess has been made.
    pub fn guess(&self) -> Option<usize> {
        match self.status {
            EpisodeStatus::Guessed { class } => Some(class),
            _ => None,
        }
    }

    /// Class distribution produced by the guess, once made.
    pub fn probabilities(&self) -> Option<&[f64]> {
        self.probabilities.as_deref()
    }

    /// Features queried so far, ascending.
    pub fn acquired(&self) -> Vec<usize> {
        (0..self.mask.guess_action())
            .filter(|&a| !self.mask.is_enabled(a))
            .collect()
    }
}

/// Result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Observation after the step.
    pub state: Vec<f64>,
    /// `None` in test mode.
    pub reward: Option<f64>,
    pub done: bool,
    /// Predicted class when this step was a guess.
    pub guess: Option<usize>,
}

/// The episodic feature-acquisition MDP.
///
/// Actions `0..F` query a feature; action `F` asks the predictor for a guess
/// and ends the episode.
pub struct FeatureAcquisitionEnv<P, E = FlatMaskEncoder> {
    dataset: Dataset,
    predictor: P,
    encoder: E,
    config: EnvConfig,
    rng: StdRng,
}

impl<P: Predictor> FeatureAcquisitionEnv<P, FlatMaskEncoder> {
    /// Creates an environment with the flat `[values | counters]` encoding.
    pub fn new(dataset: Dataset, predictor: P, config: EnvConfig, seed: u64) -> Result<Self> {
        let encoder = FlatMaskEncoder::new(dataset.n_features());
        Self::with_encoder(dataset, predictor, encoder, config, seed)
    }
}

impl<P: Predictor, E: StateEncoder> FeatureAcquisitionEnv<P, E> {
    /// Creates an environment with a custom state encoder.
    pub fn with_encoder(
        dataset: Dataset,
        predictor: P,
        encoder: E,
        config: EnvConfig,
        seed: u64,
    ) -> Result<Self> {
        if predictor.input_dim() != encoder.predictor_dim() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "predictor input",
                expected: encoder.predictor_dim(),
                actual: predictor.input_dim(),
            });
        }
        if predictor.n_classes() != dataset.n_classes() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "predictor classes",
                expected: dataset.n_classes(),
                actual: predictor.n_classes(),
            });
        }
        if config.episode_length == 0 {
            return Err(AcquisitionError::InvalidConfig(
                "episode_length must be positive".into(),
            ));
        }
        Ok(Self {
            dataset,
            predictor,
            encoder,
            config,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Number of acquirable features.
    pub fn n_features(&self) -> usize {
        self.dataset.n_features()
    }

    /// `F + 1`: one query per feature plus the guess.
    pub fn n_actions(&self) -> usize {
        self.dataset.n_features() + 1
    }

    /// Index of the guess action (`n_features`).
    pub fn guess_action(&self) -> usize {
        self.dataset.n_features()
    }

    /// Width of the encoded state fed to the agent.
    pub fn state_dim(&self) -> usize {
        self.encoder.state_dim()
    }

    /// Step budget per episode.
    pub fn episode_length(&self) -> usize {
        self.config.episode_length
    }

    /// The train/val/test partitions.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// The classifier scoring guesses.
    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    /// Mutable access to the classifier.
    pub fn predictor_mut(&mut self) -> &mut P {
        &mut self.predictor
    }

    /// The state encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Episode settings.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Starts an episode.
    ///
    /// Training mode draws a uniformly random training instance and ignores
    /// `instance`; validation and test use the caller's index.
    pub fn reset(&mut self, mode: Mode, instance: usize) -> Result<EpisodeContext> {
        let partition = self.dataset.partition(mode);
        let index = match mode {
            Mode::Training => self.rng.gen_range(0..partition.len()),
            _ => instance,
        };
        let (_, label) =
            partition
                .instance(index)
                .ok_or(AcquisitionError::InstanceOutOfRange {
                    mode,
                    index,
                    len: partition.len(),
                })?;

        Ok(EpisodeContext {
            mode,
            instance: index,
            label,
            encoded: self.encoder.initial(),
            mask: ActionMask::new(self.dataset.n_features()),
            steps: 0,
            status: EpisodeStatus::Active,
            train_predictor: mode.is_training() && self.config.train_predictor,
            probabilities: None,
        })
    }

    /// Applies `action` to the episode.
    ///
    /// Queries reveal one feature and disable it in the context's mask; the
    /// guess action scores the current state with the predictor. The episode
    /// terminates on a guess, or once the step count reaches the budget.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::InvalidAction`] for indices above `F`,
    /// [`AcquisitionError::MaskedAction`] for repeated queries and
    /// [`AcquisitionError::EpisodeTerminated`] after termination.
    pub fn step(&mut self, ctx: &mut EpisodeContext, action: usize) -> Result<StepOutcome> {
        if ctx.is_done() {
            return Err(AcquisitionError::EpisodeTerminated);
        }
        if action >= self.n_actions() {
            return Err(AcquisitionError::InvalidAction {
                action,
                n_actions: self.n_actions(),
            });
        }
        if !ctx.mask.is_enabled(action) {
            return Err(AcquisitionError::MaskedAction(action));
        }

        let reward = if action < self.n_features() {
            self.query(ctx, action)?
        } else {
            self.guess(ctx)?
        };

        ctx.steps += 1;
        if ctx.status == EpisodeStatus::Active && ctx.steps >= self.config.episode_length {
            ctx.status = EpisodeStatus::BudgetExhausted;
        }

        Ok(StepOutcome {
            state: ctx.encoded.observation.clone(),
            reward,
            done: ctx.is_done(),
            guess: ctx.guess(),
        })
    }

    /// Takes the guess action on an episode that has not guessed yet, even if
    /// its budget is exhausted. Counts as one more step.
    pub fn force_guess(&mut self, ctx: &mut EpisodeContext) -> Result<StepOutcome> {
        if ctx.guess().is_some() {
            return Err(AcquisitionError::GuessAlreadyMade);
        }
        let reward = self.guess(ctx)?;
        ctx.steps += 1;
        Ok(StepOutcome {
            state: ctx.encoded.observation.clone(),
            reward,
            done: true,
            guess: ctx.guess(),
        })
    }

    fn query(&mut self, ctx: &mut EpisodeContext, feature: usize) -> Result<Option<f64>> {
        let value = self.dataset.partition(ctx.mode).features[ctx.instance][feature];
        let next = self.encoder.encode(&ctx.encoded, feature, value);

        let shaping = if self.encoder.shaped_reward() && ctx.mode != Mode::Test {
            let before = self.true_class_probability(&ctx.encoded.observation, ctx.label)?;
            let after = self.true_class_probability(&next.observation, ctx.label)?;
            Some((before, after))
        } else {
            None
        };
        let reward = RewardComputer::query(
            ctx.mode,
            self.config.reward_noise_scale,
            shaping,
            &mut self.rng,
        );

        if ctx.train_predictor && self.encoder.shaped_reward() {
            let input = self.encoder.predictor_input(&next.observation).to_vec();
            self.online_update(&input, ctx.label)?;
        }

        ctx.encoded = next;
        ctx.mask.disable(feature);
        Ok(reward)
    }

    fn guess(&mut self, ctx: &mut EpisodeContext) -> Result<Option<f64>> {
        let input = self
            .encoder
            .predictor_input(&ctx.encoded.observation)
            .to_vec();
        self.predictor.set_training_mode(false);
        let probabilities = self.predictor.forward(&input)?;
        let class = argmax(&probabilities);
        let reward = RewardComputer::guess(ctx.mode, probabilities[ctx.label]);

        if ctx.train_predictor {
            self.online_update(&input, ctx.label)?;
        }

        ctx.status = EpisodeStatus::Guessed { class };
        ctx.probabilities = Some(probabilities);
        Ok(reward)
    }

    fn true_class_probability(&mut self, observation: &[f64], label: usize) -> Result<f64> {
        self.predictor.set_training_mode(false);
        let input = self.encoder.predictor_input(observation);
        Ok(self.predictor.forward(input)?[label])
    }

    /// One supervised step on the predictor followed by a learning-rate tick.
    fn online_update(&mut self, input: &[f64], label: usize) -> Result<()> {
        self.predictor.set_training_mode(true);
        let loss = self.predictor.update(input, label)?;
        self.predictor.anneal_learning_rate();
        self.predictor.set_training_mode(false);
        tracing::trace!(loss, label, "predictor online update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Partition;
    use crate::predictor::{FrozenPredictor, SoftmaxRegression};
    use crate::schedule::StepDecay;

    const F: usize = 8;

    fn dataset(train: Vec<(Vec<f64>, usize)>) -> Dataset {
        let (x, y): (Vec<_>, Vec<_>) = train.into_iter().unzip();
        let val = Partition::new(
            vec![vec![0.1; F], vec![0.9; F]],
            vec![0, 1],
        );
        let test = Partition::new(vec![vec![0.5; F]], vec![1]);
        Dataset::new(Partition::new(x, y), val, test, F, 2).unwrap()
    }

    fn single_instance() -> Dataset {
        let mut row = vec![0.0; F];
        row[3] = 0.6;
        row[5] = -0.4;
        dataset(vec![(row, 1)])
    }

    fn seeded_predictor() -> SoftmaxRegression {
        let mut rng = StdRng::seed_from_u64(17);
        SoftmaxRegression::with_rng(F, 2, StepDecay::constant(0.1), 0.0, &mut rng)
    }

    fn env_config(train_predictor: bool) -> EnvConfig {
        EnvConfig {
            episode_length: 7,
            train_predictor,
            reward_noise_scale: 0.01,
        }
    }

    fn make_env() -> FeatureAcquisitionEnv<SoftmaxRegression> {
        FeatureAcquisitionEnv::new(single_instance(), seeded_predictor(), env_config(false), 3)
            .unwrap()
    }

    #[test]
    fn reset_returns_empty_state_and_full_mask() {
        let mut env = make_env();
        let ctx = env.reset(Mode::Training, 0).unwrap();
        assert_eq!(ctx.state(), vec![0.0; 2 * F].as_slice());
        assert_eq!(ctx.mask().enabled_actions().len(), F + 1);
        assert_eq!(ctx.steps(), 0);
        assert!(!ctx.is_done());
    }

    #[test]
    fn query_then_guess_scenario() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();

        let out = env.step(&mut ctx, 3).unwrap();
        assert_eq!(out.state[3], 0.6);
        assert_eq!(out.state[3 + F], 1.0);
        for i in (F..2 * F).filter(|&i| i != 3 + F) {
            assert_eq!(out.state[i], 0.0);
        }
        assert_eq!(out.guess, None);
        assert!(!out.done);
        let r = out.reward.unwrap();
        assert!((0.0..0.01).contains(&r));

        let expected = env.predictor().forward(&out.state[..F]).unwrap()[1];
        let out = env.step(&mut ctx, F).unwrap();
        assert!(out.done);
        assert!(out.guess.is_some());
        assert_eq!(out.reward, Some(expected));
        assert_eq!(ctx.steps(), 2);
    }

    #[test]
    fn repeated_query_is_rejected() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        env.step(&mut ctx, 2).unwrap();
        assert!(!ctx.mask().is_enabled(2));
        assert!(matches!(
            env.step(&mut ctx, 2),
            Err(AcquisitionError::MaskedAction(2))
        ));
    }

    #[test]
    fn out_of_range_action_is_rejected() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        assert!(matches!(
            env.step(&mut ctx, F + 1),
            Err(AcquisitionError::InvalidAction { .. })
        ));
    }

    #[test]
    fn budget_terminates_exactly_at_episode_length() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        for a in 0..7 {
            let out = env.step(&mut ctx, a).unwrap();
            assert_eq!(out.done, a == 6, "step {a}");
            assert_eq!(out.guess, None);
        }
        assert_eq!(ctx.status(), EpisodeStatus::BudgetExhausted);
        assert!(matches!(
            env.step(&mut ctx, 7),
            Err(AcquisitionError::EpisodeTerminated)
        ));
    }

    #[test]
    fn guess_terminates_immediately() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        let out = env.step(&mut ctx, F).unwrap();
        assert!(out.done);
        assert_eq!(ctx.steps(), 1);
        assert!(ctx.probabilities().is_some());
    }

    #[test]
    fn mask_stays_disabled_for_the_whole_episode() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        let taken = [5, 1, 7];
        for (i, &a) in taken.iter().enumerate() {
            env.step(&mut ctx, a).unwrap();
            for &earlier in &taken[..=i] {
                assert!(!ctx.mask().is_enabled(earlier));
            }
            assert!(ctx.mask().is_enabled(F));
        }
        assert_eq!(ctx.acquired(), vec![1, 5, 7]);
    }

    #[test]
    fn force_guess_after_budget_counts_a_step() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Validation, 1).unwrap();
        for a in 0..7 {
            env.step(&mut ctx, a).unwrap();
        }
        let out = env.force_guess(&mut ctx).unwrap();
        assert!(out.done);
        assert!(out.guess.is_some());
        assert_eq!(ctx.steps(), 8);
        assert!(matches!(
            env.force_guess(&mut ctx),
            Err(AcquisitionError::GuessAlreadyMade)
        ));
    }

    #[test]
    fn test_mode_rewards_are_none() {
        let mut env = make_env();
        let mut ctx = env.reset(Mode::Test, 0).unwrap();
        assert_eq!(env.step(&mut ctx, 0).unwrap().reward, None);
        assert_eq!(env.step(&mut ctx, F).unwrap().reward, None);
    }

    #[test]
    fn evaluation_index_is_checked() {
        let mut env = make_env();
        assert!(matches!(
            env.reset(Mode::Validation, 2),
            Err(AcquisitionError::InstanceOutOfRange { len: 2, .. })
        ));
        let ctx = env.reset(Mode::Validation, 1).unwrap();
        assert_eq!(ctx.label(), 1);
    }

    #[test]
    fn training_guess_updates_predictor_when_enabled() {
        let mut env = FeatureAcquisitionEnv::new(
            single_instance(),
            seeded_predictor(),
            env_config(true),
            3,
        )
        .unwrap();
        let before = env.predictor().clone();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        env.step(&mut ctx, 3).unwrap();
        // Queries do not train the predictor with the flat encoding.
        assert_eq!(env.predictor(), &before);
        let out = env.step(&mut ctx, F).unwrap();
        assert_ne!(env.predictor(), &before);

        // The reward was computed before the update.
        let p_before = before.forward(&out.state[..F]).unwrap()[1];
        assert_eq!(out.reward, Some(p_before));
    }

    #[test]
    fn validation_never_updates_predictor() {
        let mut env = FeatureAcquisitionEnv::new(
            single_instance(),
            seeded_predictor(),
            env_config(true),
            3,
        )
        .unwrap();
        let before = env.predictor().clone();
        let mut ctx = env.reset(Mode::Validation, 0).unwrap();
        env.step(&mut ctx, F).unwrap();
        assert_eq!(env.predictor(), &before);
    }

    #[test]
    fn recurrent_encoder_shapes_query_rewards() {
        let mut rng = StdRng::seed_from_u64(30);
        let encoder = RecurrentCellEncoder::new(F, F, &mut rng);
        let predictor = FrozenPredictor::new(seeded_predictor());
        let mut env = FeatureAcquisitionEnv::with_encoder(
            single_instance(),
            predictor,
            encoder,
            env_config(true),
            3,
        )
        .unwrap();
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        let s0 = ctx.state().to_vec();
        let out = env.step(&mut ctx, 3).unwrap();

        let p0 = env.predictor().forward(&s0).unwrap()[1];
        let p1 = env.predictor().forward(&out.state).unwrap()[1];
        assert!((out.reward.unwrap() - (p1 - p0)).abs() < 1e-12);

        let guess = env.step(&mut ctx, F).unwrap();
        assert_eq!(guess.reward, Some(p1));
        assert_eq!(guess.state, out.state);
    }

    fn recurrent_env(
        predictor: SoftmaxRegression,
    ) -> FeatureAcquisitionEnv<SoftmaxRegression, RecurrentCellEncoder> {
        let mut rng = StdRng::seed_from_u64(30);
        let encoder = RecurrentCellEncoder::new(F, F, &mut rng);
        FeatureAcquisitionEnv::with_encoder(
            single_instance(),
            predictor,
            encoder,
            env_config(true),
            3,
        )
        .unwrap()
    }

    fn decaying_predictor() -> SoftmaxRegression {
        let mut rng = StdRng::seed_from_u64(17);
        SoftmaxRegression::with_rng(F, 2, StepDecay::new(0.1, 0.5, 1, 0.0), 0.0, &mut rng)
    }

    #[test]
    fn recurrent_encoder_trains_predictor_on_every_query() {
        let mut env = recurrent_env(decaying_predictor());
        let mut ctx = env.reset(Mode::Training, 0).unwrap();
        let s0 = ctx.state().to_vec();
        let before = env.predictor().clone();
        let lr0 = env.predictor().learning_rate();

        let out = env.step(&mut ctx, 3).unwrap();
        assert_ne!(env.predictor(), &before);
        assert!((env.predictor().learning_rate() - lr0 * 0.5).abs() < 1e-12);

        // Shaping uses the distribution from before the update.
        let p0 = before.forward(&s0).unwrap()[1];
        let p1 = before.forward(&out.state).unwrap()[1];
        assert!((out.reward.unwrap() - (p1 - p0)).abs() < 1e-12);

        let after_query = env.predictor().clone();
        let out = env.step(&mut ctx, 5).unwrap();
        assert_ne!(env.predictor(), &after_query);
        assert!((env.predictor().learning_rate() - lr0 * 0.25).abs() < 1e-12);

        let after_second = env.predictor().clone();
        let guess = env.step(&mut ctx, F).unwrap();
        assert_eq!(guess.reward, Some(after_second.forward(&out.state).unwrap()[1]));
        assert!((env.predictor().learning_rate() - lr0 * 0.125).abs() < 1e-12);
    }

    #[test]
    fn recurrent_encoder_leaves_predictor_alone_outside_training() {
        let mut env = recurrent_env(decaying_predictor());
        let before = env.predictor().clone();
        let mut ctx = env.reset(Mode::Validation, 1).unwrap();
        env.step(&mut ctx, 3).unwrap();
        env.step(&mut ctx, 5).unwrap();
        env.step(&mut ctx, F).unwrap();
        assert_eq!(env.predictor(), &before);
        assert_eq!(env.predictor().learning_rate(), before.learning_rate());
    }

    #[test]
    fn encoder_and_predictor_widths_must_agree() {
        let predictor = SoftmaxRegression::new(F + 1, 2, StepDecay::constant(0.1), 0.0);
        assert!(FeatureAcquisitionEnv::new(single_instance(), predictor, env_config(false), 0).is_err());
    }
}
