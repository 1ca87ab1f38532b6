//! Reward computation for the acquisition environment.
//!
//! Rewards are mode-dependent:
//!
//! - Test mode: no reward at all (`None`).
//! - Query step: a uniform draw from `[0, noise_scale)`, or, with a shaped
//!   encoder, the change in true-class probability the query produced.
//! - Guess step: the predictor's probability on the true class.

use rand::Rng;

use crate::types::Mode;

/// Stateless reward rules.
pub struct RewardComputer;

impl RewardComputer {
    /// Reward for a query step.
    ///
    /// `shaping` carries `(p_before, p_after)` on the true class when the
    /// encoder uses potential-based shaping.
    pub fn query<R: Rng>(
        mode: Mode,
        noise_scale: f64,
        shaping: Option<(f64, f64)>,
        rng: &mut R,
    ) -> Option<f64> {
        if mode == Mode::Test {
            return None;
        }
        match shaping {
            Some((before, after)) => Some(after - before),
            None => Some(noise_scale * rng.gen::<f64>()),
        }
    }

    /// Reward for a guess step.
    pub fn guess(mode: Mode, true_class_probability: f64) -> Option<f64> {
        if mode == Mode::Test {
            return None;
        }
        Some(true_class_probability)
    }
}
