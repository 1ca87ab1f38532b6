//! Double-DQN agent.
//!
//! Holds an online and a target action-value function of the same shape.
//! Action selection is ε-greedy over the episode's action mask; training
//! decouples action selection (online) from action evaluation (target).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{AcquisitionError, Result};
use crate::predictor::argmax;
use crate::qfunction::QFunction;
use crate::training::Transition;
use crate::types::{ActionMask, Mode};

/// Double-DQN learner over a [`QFunction`] pair.
pub struct DoubleDqnAgent<Q> {
    online: Q,
    target: Q,
    rng: StdRng,
}

impl<Q: QFunction> DoubleDqnAgent<Q> {
    /// Creates the agent and hard-syncs `target` to `online`.
    pub fn new(online: Q, mut target: Q, seed: u64) -> Result<Self> {
        target.copy_from(&online)?;
        Ok(Self {
            online,
            target,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// The online network, used for action selection.
    pub fn online(&self) -> &Q {
        &self.online
    }

    /// Mutable access to the online network.
    pub fn online_mut(&mut self) -> &mut Q {
        &mut self.online
    }

    /// The target network, used to evaluate bootstrapped actions.
    pub fn target(&self) -> &Q {
        &self.target
    }

    /// ε-greedy action over the enabled actions of `mask`.
    ///
    /// Exploration only happens in training mode with `epsilon > 0`; it draws
    /// uniformly among enabled actions. The greedy branch takes the argmax of
    /// the masked online Q-values.
    pub fn select_action(
        &mut self,
        state: &[f64],
        epsilon: f64,
        mask: &ActionMask,
        mode: Mode,
    ) -> Result<usize> {
        if mask.len() != self.online.n_actions() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "action mask",
                expected: self.online.n_actions(),
                actual: mask.len(),
            });
        }
        if mode.is_training() && epsilon > 0.0 && self.rng.gen::<f64>() < epsilon {
            let enabled = mask.enabled_actions();
            return Ok(enabled
                .choose(&mut self.rng)
                .copied()
                .unwrap_or_else(|| mask.guess_action()));
        }
        let q = self.online.forward(&[state])?;
        Ok(mask.masked_argmax(&q[0]))
    }

    /// One Double-DQN update on a sampled batch; returns the MSE loss.
    pub fn train_step(&mut self, batch: &[&Transition], gamma: f64) -> Result<f64> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let states: Vec<&[f64]> = batch.iter().map(|t| t.state.as_slice()).collect();
        let next_states: Vec<&[f64]> = batch.iter().map(|t| t.next_state.as_slice()).collect();

        let q_current = self.online.forward(&states)?;
        let q_online_next = self.online.forward(&next_states)?;
        let q_target_next = self.target.forward(&next_states)?;

        let targets = double_dqn_targets(batch, q_current, &q_online_next, &q_target_next, gamma)?;
        self.online.train(&states, &targets)
    }

    /// Hard-copies the online parameters into the target function.
    pub fn sync_target(&mut self) -> Result<()> {
        self.target.copy_from(&self.online)
    }

    /// Ticks the online learning-rate schedule.
    pub fn anneal_learning_rate(&mut self) {
        self.online.anneal_learning_rate();
    }
}

/// Builds the regression target for a batch.
///
/// Starts from the online Q-values of the current states and overwrites only
/// the taken action with `r + γ · Q_target(s')[argmax_a Q_online(s')] · (1 − done)`.
pub fn double_dqn_targets(
    batch: &[&Transition],
    mut q_current: Vec<Vec<f64>>,
    q_online_next: &[Vec<f64>],
    q_target_next: &[Vec<f64>],
    gamma: f64,
) -> Result<Vec<Vec<f64>>> {
    for (i, transition) in batch.iter().enumerate() {
        let row = &mut q_current[i];
        if transition.action >= row.len() {
            return Err(AcquisitionError::InvalidAction {
                action: transition.action,
                n_actions: row.len(),
            });
        }
        let target = if transition.done {
            transition.reward
        } else {
            let best = argmax(&q_online_next[i]);
            transition.reward + gamma * q_target_next[i][best]
        };
        row[transition.action] = target;
    }
    Ok(q_current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qfunction::LinearQFunction;
    use crate::schedule::StepDecay;

    fn transition(
        state: Vec<f64>,
        action: usize,
        reward: f64,
        next: Vec<f64>,
        done: bool,
    ) -> Transition {
        Transition {
            state,
            action,
            reward,
            next_state: next,
            done,
        }
    }

    fn identity_q(lr: f64) -> LinearQFunction {
        LinearQFunction::from_parameters(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]],
            vec![0.0, 0.0, 0.0],
            StepDecay::constant(lr),
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn new_agent_starts_synced() {
        let online = identity_q(0.1);
        let target = LinearQFunction::new(2, 3, StepDecay::constant(0.1), 0.0);
        let agent = DoubleDqnAgent::new(online, target, 0).unwrap();
        assert_eq!(agent.online(), agent.target());
    }

    #[test]
    fn greedy_selection_respects_mask() {
        let mut agent = DoubleDqnAgent::new(identity_q(0.1), identity_q(0.1), 0).unwrap();
        let mut mask = ActionMask::new(2);
        // q = [5, 1, 0]
        assert_eq!(agent.select_action(&[5.0, 1.0], 0.0, &mask, Mode::Test).unwrap(), 0);
        mask.disable(0);
        assert_eq!(agent.select_action(&[5.0, 1.0], 0.0, &mask, Mode::Test).unwrap(), 1);
        mask.disable(1);
        assert_eq!(agent.select_action(&[5.0, 1.0], 0.0, &mask, Mode::Test).unwrap(), 2);
    }

    #[test]
    fn masked_action_loses_to_negative_legal_value() {
        let mut agent = DoubleDqnAgent::new(identity_q(0.1), identity_q(0.1), 0).unwrap();
        let mut mask = ActionMask::new(2);
        mask.disable(0);
        // q = [10, -3, 0]: guess (0) beats feature 1 (-3), feature 0 is masked.
        let a = agent.select_action(&[10.0, -3.0], 0.0, &mask, Mode::Validation).unwrap();
        assert_eq!(a, 2);
    }

    #[test]
    fn exploration_never_picks_disabled_actions() {
        let mut agent = DoubleDqnAgent::new(identity_q(0.1), identity_q(0.1), 9).unwrap();
        let mut mask = ActionMask::new(2);
        mask.disable(1);
        for _ in 0..200 {
            let a = agent.select_action(&[0.0, 0.0], 1.0, &mask, Mode::Training).unwrap();
            assert_ne!(a, 1);
        }
    }

    #[test]
    fn evaluation_modes_ignore_epsilon() {
        let mut agent = DoubleDqnAgent::new(identity_q(0.1), identity_q(0.1), 4).unwrap();
        let mask = ActionMask::new(2);
        for _ in 0..50 {
            let a = agent.select_action(&[0.0, 7.0], 1.0, &mask, Mode::Validation).unwrap();
            assert_eq!(a, 1);
        }
    }

    #[test]
    fn targets_use_online_argmax_and_target_values() {
        let t = transition(vec![0.0, 0.0], 2, 0.5, vec![1.0, 1.0], false);
        let q_current = vec![vec![0.1, 0.2, 0.3]];
        // Online prefers action 1 at s'; target rates action 1 at 4.0.
        let q_online_next = vec![vec![1.0, 2.0, 0.0]];
        let q_target_next = vec![vec![9.0, 4.0, 0.0]];
        let targets =
            double_dqn_targets(&[&t], q_current, &q_online_next, &q_target_next, 0.5).unwrap();
        assert_eq!(targets, vec![vec![0.1, 0.2, 0.5 + 0.5 * 4.0]]);
    }

    #[test]
    fn terminal_targets_are_the_reward() {
        let t = transition(vec![0.0, 0.0], 0, 0.8, vec![1.0, 1.0], true);
        let targets = double_dqn_targets(
            &[&t],
            vec![vec![0.0, 0.0, 0.0]],
            &[vec![5.0, 5.0, 5.0]],
            &[vec![5.0, 5.0, 5.0]],
            0.9,
        )
        .unwrap();
        assert_eq!(targets[0][0], 0.8);
    }

    #[test]
    fn train_step_moves_taken_action_toward_reward() {
        let mut agent = DoubleDqnAgent::new(identity_q(0.2), identity_q(0.2), 0).unwrap();
        let t = transition(vec![1.0, 0.0], 1, 1.0, vec![0.0, 0.0], true);
        let before = agent.online().forward(&[[1.0, 0.0]]).unwrap();
        let loss = agent.train_step(&[&t], 0.85).unwrap();
        assert!(loss > 0.0);
        let after = agent.online().forward(&[[1.0, 0.0]]).unwrap();
        assert!(after[0][1] > before[0][1]);
        assert_eq!(after[0][0], before[0][0]);
        assert_eq!(after[0][2], before[0][2]);
    }

    #[test]
    fn sync_copies_online_into_target() {
        let mut agent = DoubleDqnAgent::new(identity_q(0.2), identity_q(0.2), 0).unwrap();
        let t = transition(vec![1.0, 1.0], 0, 3.0, vec![0.0, 0.0], true);
        agent.train_step(&[&t], 0.85).unwrap();
        assert_ne!(agent.online(), agent.target());
        agent.sync_target().unwrap();
        assert_eq!(agent.online(), agent.target());
    }
}
