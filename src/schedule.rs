//! Exploration and learning-rate schedules.

use serde::{Deserialize, Serialize};

/// Linear ε-greedy annealing.
///
/// ```text
/// 1.0 ---|\
///        | \
///        |  \
/// min_eps+---+------->
///            max_episode
/// ```
///
/// Returns `max(1.0 + episode * (min_eps - 1.0) / max_episode, min_eps)`,
/// pinned to exactly `min_eps` from `max_episode` onwards.
pub fn epsilon_annealing(episode: usize, max_episode: usize, min_eps: f64) -> f64 {
    if episode >= max_episode {
        return min_eps;
    }
    let slope = (min_eps - 1.0) / max_episode as f64;
    (slope * episode as f64 + 1.0).max(min_eps)
}

/// Step-decay learning-rate schedule with a floor.
///
/// After `t` ticks the rate is
/// `max(base_lr * decay_factor^floor((t + 1) / step_size), min_lr)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDecay {
    pub base_lr: f64,
    pub decay_factor: f64,
    pub step_size: u64,
    pub min_lr: f64,
    ticks: u64,
}

impl StepDecay {
    /// Creates a schedule starting at tick zero. A `step_size` of zero is treated as one.
    pub fn new(base_lr: f64, decay_factor: f64, step_size: u64, min_lr: f64) -> Self {
        Self {
            base_lr,
            decay_factor,
            step_size: step_size.max(1),
            min_lr,
            ticks: 0,
        }
    }

    /// A schedule that never decays.
    pub fn constant(lr: f64) -> Self {
        Self::new(lr, 1.0, u64::MAX, 0.0)
    }

    /// Learning rate for the current tick.
    pub fn current(&self) -> f64 {
        let exponent = self.ticks.saturating_add(1) / self.step_size;
        let lr = self.base_lr * self.decay_factor.powf(exponent as f64);
        lr.max(self.min_lr)
    }

    /// Advances by one tick and returns the new rate.
    pub fn advance(&mut self) -> f64 {
        self.ticks = self.ticks.saturating_add(1);
        self.current()
    }

    /// Number of ticks advanced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_boundaries() {
        assert_eq!(epsilon_annealing(0, 2000, 0.01), 1.0);
        assert_eq!(epsilon_annealing(2000, 2000, 0.01), 0.01);
        assert_eq!(epsilon_annealing(5000, 2000, 0.01), 0.01);
    }

    #[test]
    fn epsilon_is_non_increasing() {
        let mut prev = f64::INFINITY;
        for i in 0..2500 {
            let eps = epsilon_annealing(i, 2000, 0.05);
            assert!(eps <= prev, "eps increased at episode {i}");
            assert!(eps >= 0.05);
            prev = eps;
        }
    }

    #[test]
    fn epsilon_midpoint() {
        let eps = epsilon_annealing(1000, 2000, 0.0);
        assert!((eps - 0.5).abs() < 1e-12);
    }

    #[test]
    fn epsilon_with_zero_horizon_is_minimum() {
        assert_eq!(epsilon_annealing(0, 0, 0.2), 0.2);
    }

    #[test]
    fn step_decay_decays_and_floors() {
        let mut lr = StepDecay::new(1e-2, 0.1, 3, 1e-4);
        assert_eq!(lr.current(), 1e-2);
        lr.advance();
        // (1 + 1) / 3 == 0
        assert_eq!(lr.current(), 1e-2);
        lr.advance();
        // (2 + 1) / 3 == 1
        assert!((lr.current() - 1e-3).abs() < 1e-15);
        for _ in 0..30 {
            lr.advance();
        }
        assert_eq!(lr.current(), 1e-4);
    }

    #[test]
    fn constant_schedule_never_moves() {
        let mut lr = StepDecay::constant(0.3);
        for _ in 0..100 {
            assert_eq!(lr.advance(), 0.3);
        }
    }
}
