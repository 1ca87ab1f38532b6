//! Episode state representations.
//!
//! A [`StateEncoder`] owns how acquired `(feature, value)` pairs become the
//! observation the agent sees and the input the predictor scores:
//!
//! - [`FlatMaskEncoder`]: `[values(F) | acquired counters(F)]`.
//! - [`RecurrentCellEncoder`]: fixed-parameter LSTM cell; the observation is
//!   its hidden state.

use rand::Rng;

/// Observation plus any hidden memory the encoder carries between steps.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedState {
    /// What the agent observes.
    pub observation: Vec<f64>,
    /// Encoder-private memory (the LSTM cell state). Empty for flat encodings.
    pub memory: Vec<f64>,
}

/// Turns acquired feature values into agent observations and predictor inputs.
pub trait StateEncoder {
    /// Width of the observation vector.
    fn state_dim(&self) -> usize;

    /// Width of the slice handed to the predictor.
    fn predictor_dim(&self) -> usize;

    /// State at the start of an episode.
    fn initial(&self) -> EncodedState;

    /// State after revealing `value` for `feature`.
    fn encode(&self, previous: &EncodedState, feature: usize, value: f64) -> EncodedState;

    /// The part of an observation the predictor consumes.
    fn predictor_input<'a>(&self, observation: &'a [f64]) -> &'a [f64];

    /// Whether query steps are rewarded by the change in true-class
    /// probability instead of a small random nudge.
    fn shaped_reward(&self) -> bool;
}

/// Flat `[values | counters]` encoding of width `2F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatMaskEncoder {
    n_features: usize,
}

impl FlatMaskEncoder {
    /// Creates an encoder for `n_features` features.
    pub fn new(n_features: usize) -> Self {
        Self { n_features }
    }
}

impl StateEncoder for FlatMaskEncoder {
    fn state_dim(&self) -> usize {
        2 * self.n_features
    }

    fn predictor_dim(&self) -> usize {
        self.n_features
    }

    fn initial(&self) -> EncodedState {
        EncodedState {
            observation: vec![0.0; 2 * self.n_features],
            memory: Vec::new(),
        }
    }

    fn encode(&self, previous: &EncodedState, feature: usize, value: f64) -> EncodedState {
        let mut observation = previous.observation.clone();
        observation[feature] = value;
        observation[feature + self.n_features] = 1.0;
        EncodedState {
            observation,
            memory: Vec::new(),
        }
    }

    fn predictor_input<'a>(&self, observation: &'a [f64]) -> &'a [f64] {
        &observation[..self.n_features]
    }

    fn shaped_reward(&self) -> bool {
        false
    }
}

/// LSTM cell with fixed parameters fed one `(feature, value)` pair per step.
///
/// The step input is the `F + 1` vector that is zero except `value` at index
/// `feature`. Gate order in the stacked weights is input, forget, cell, output.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentCellEncoder {
    n_features: usize,
    hidden_dim: usize,
    /// `4H × (F + 1)`
    w_input: Vec<Vec<f64>>,
    /// `4H × H`
    w_hidden: Vec<Vec<f64>>,
    /// `4H`
    bias: Vec<f64>,
    initial_h: Vec<f64>,
    initial_c: Vec<f64>,
}

impl RecurrentCellEncoder {
    /// Draws all parameters from `U(-1/√H, 1/√H)` and the initial hidden and
    /// cell states from `U(-1, 1)`.
    pub fn new<R: Rng>(n_features: usize, hidden_dim: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (hidden_dim.max(1) as f64).sqrt();
        let matrix = |rows: usize, cols: usize, rng: &mut R| -> Vec<Vec<f64>> {
            (0..rows)
                .map(|_| (0..cols).map(|_| rng.gen_range(-bound..bound)).collect())
                .collect()
        };
        let w_input = matrix(4 * hidden_dim, n_features + 1, &mut *rng);
        let w_hidden = matrix(4 * hidden_dim, hidden_dim, &mut *rng);
        let bias = (0..4 * hidden_dim)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let initial_h = (0..hidden_dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let initial_c = (0..hidden_dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self {
            n_features,
            hidden_dim,
            w_input,
            w_hidden,
            bias,
            initial_h,
            initial_c,
        }
    }

    /// Width of the hidden state.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn cell(&self, x: &[f64], h: &[f64], c: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let gates: Vec<f64> = (0..4 * self.hidden_dim)
            .map(|g| {
                let from_x: f64 = self.w_input[g].iter().zip(x).map(|(w, v)| w * v).sum();
                let from_h: f64 = self.w_hidden[g].iter().zip(h).map(|(w, v)| w * v).sum();
                from_x + from_h + self.bias[g]
            })
            .collect();
        let hd = self.hidden_dim;
        let mut h_next = vec![0.0; hd];
        let mut c_next = vec![0.0; hd];
        for j in 0..hd {
            let i = sigmoid(gates[j]);
            let f = sigmoid(gates[hd + j]);
            let g = gates[2 * hd + j].tanh();
            let o = sigmoid(gates[3 * hd + j]);
            c_next[j] = f * c[j] + i * g;
            h_next[j] = o * c_next[j].tanh();
        }
        (h_next, c_next)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl StateEncoder for RecurrentCellEncoder {
    fn state_dim(&self) -> usize {
        self.hidden_dim
    }

    fn predictor_dim(&self) -> usize {
        self.hidden_dim
    }

    fn initial(&self) -> EncodedState {
        EncodedState {
            observation: self.initial_h.clone(),
            memory: self.initial_c.clone(),
        }
    }

    fn encode(&self, previous: &EncodedState, feature: usize, value: f64) -> EncodedState {
        let mut x = vec![0.0; self.n_features + 1];
        x[feature] = value;
        let (h, c) = self.cell(&x, &previous.observation, &previous.memory);
        EncodedState {
            observation: h,
            memory: c,
        }
    }

    fn predictor_input<'a>(&self, observation: &'a [f64]) -> &'a [f64] {
        observation
    }

    fn shaped_reward(&self) -> bool {
        true
    }
}
