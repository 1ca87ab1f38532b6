//! Core types shared by the environment, the agent and the training loop.
//!
//! Defines the episode [`Mode`] and the per-episode [`ActionMask`] that keeps
//! the agent from querying the same feature twice.

use std::fmt;

/// Which partition an episode runs against, and how rewards are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Random training instance, rewards defined, optional online predictor updates.
    Training,
    /// Caller-selected validation instance, greedy rollouts, no learning.
    Validation,
    /// Caller-selected test instance; rewards are undefined.
    Test,
}

impl Mode {
    /// Returns all modes in partition order.
    pub fn all() -> [Mode; 3] {
        [Mode::Training, Mode::Validation, Mode::Test]
    }

    /// Returns true for the only mode in which the agent explores.
    pub fn is_training(&self) -> bool {
        matches!(self, Mode::Training)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Training => write!(f, "training"),
            Mode::Validation => write!(f, "val"),
            Mode::Test => write!(f, "test"),
        }
    }
}

/// Per-episode record of which actions remain legal.
///
/// Holds one entry per action: `F` query actions followed by the guess action
/// at index `F`. A query action, once disabled, stays disabled until the mask
/// is rebuilt for the next episode. The guess action is never disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMask {
    enabled: Vec<bool>,
}

impl ActionMask {
    /// Creates an all-enabled mask for `n_features` query actions plus the guess.
    pub fn new(n_features: usize) -> Self {
        Self {
            enabled: vec![true; n_features + 1],
        }
    }

    /// Number of actions covered by the mask (`F + 1`).
    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    /// Always false: the guess action guarantees at least one entry.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    /// Index of the terminal guess action.
    pub fn guess_action(&self) -> usize {
        self.enabled.len() - 1
    }

    /// Returns whether `action` may still be taken. Out-of-range actions are not enabled.
    pub fn is_enabled(&self, action: usize) -> bool {
        self.enabled.get(action).copied().unwrap_or(false)
    }

    /// Permanently disables a query action. Disabling the guess action is a no-op.
    pub fn disable(&mut self, action: usize) {
        if action < self.guess_action() {
            self.enabled[action] = false;
        }
    }

    /// Indices of all currently enabled actions, ascending.
    pub fn enabled_actions(&self) -> Vec<usize> {
        self.enabled
            .iter()
            .enumerate()
            .filter_map(|(a, &on)| on.then_some(a))
            .collect()
    }

    /// Applies the mask as an additive bias: disabled actions become `-inf`.
    ///
    /// Legal values pass through untouched, so a negative legal value can
    /// never lose to a masked slot in an argmax.
    pub fn apply(&self, q_values: &[f64]) -> Vec<f64> {
        q_values
            .iter()
            .zip(&self.enabled)
            .map(|(&q, &on)| if on { q } else { f64::NEG_INFINITY })
            .collect()
    }

    /// Argmax over enabled actions; ties resolve to the lowest index.
    pub fn masked_argmax(&self, q_values: &[f64]) -> usize {
        let mut best: Option<(usize, f64)> = None;
        for (a, v) in self.apply(q_values).into_iter().enumerate() {
            if !self.enabled[a] {
                continue;
            }
            match best {
                Some((_, best_value)) if v <= best_value => {}
                _ => best = Some((a, v)),
            }
        }
        best.map_or(self.guess_action(), |(a, _)| a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_mask_enables_everything() {
        let mask = ActionMask::new(4);
        assert_eq!(mask.len(), 5);
        assert_eq!(mask.enabled_actions(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn guess_action_is_never_disabled() {
        let mut mask = ActionMask::new(3);
        mask.disable(3);
        assert!(mask.is_enabled(3));
        mask.disable(1);
        assert!(!mask.is_enabled(1));
        assert_eq!(mask.enabled_actions(), vec![0, 2, 3]);
    }

    #[test]
    fn out_of_range_is_not_enabled() {
        let mask = ActionMask::new(2);
        assert!(!mask.is_enabled(3));
    }

    #[test]
    fn argmax_ignores_masked_slot_with_negative_values() {
        let mut mask = ActionMask::new(3);
        mask.disable(0);
        // Zeroing slot 0 would make it win; the additive bias must not.
        let q = [0.0, -2.0, -1.5, -3.0];
        assert_eq!(mask.masked_argmax(&q), 2);
        assert_eq!(mask.apply(&q)[0], f64::NEG_INFINITY);
    }

    #[test]
    fn argmax_ties_resolve_to_lowest_index() {
        let mask = ActionMask::new(3);
        assert_eq!(mask.masked_argmax(&[1.0, 2.0, 2.0, 0.5]), 1);
    }

    #[test]
    fn argmax_falls_back_to_guess_when_all_queries_masked() {
        let mut mask = ActionMask::new(2);
        mask.disable(0);
        mask.disable(1);
        assert_eq!(mask.masked_argmax(&[10.0, 10.0, -100.0]), 2);
    }

    #[test]
    fn mode_display() {
        assert_eq!(Mode::Training.to_string(), "training");
        assert_eq!(Mode::Validation.to_string(), "val");
        assert_eq!(Mode::Test.to_string(), "test");
    }
}
