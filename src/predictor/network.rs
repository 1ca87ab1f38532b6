//! MLP predictor using tch-rs (PyTorch bindings).
//!
//! This module is only available with the `nn` feature.

use std::path::Path;

use tch::{nn, nn::Module, nn::OptimizerConfig, Device, Kind, Tensor};

use super::Predictor;
use crate::error::{AcquisitionError, Result};
use crate::schedule::StepDecay;

/// MLP classifier over acquired feature values.
///
/// Architecture: `input_dim → h → h → h → n_classes` with ReLU activations
/// and softmax output. Trained with Adam on cross-entropy.
pub struct MlpPredictor {
    vs: nn::VarStore,
    net: nn::Sequential,
    opt: nn::Optimizer,
    lr: StepDecay,
    input_dim: usize,
    n_classes: usize,
    training: bool,
}

impl MlpPredictor {
    /// Creates a new predictor network.
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        n_classes: usize,
        lr: StepDecay,
        weight_decay: f64,
        device: Device,
    ) -> Result<Self> {
        let vs = nn::VarStore::new(device);
        let p = &vs.root();
        let h = hidden_dim as i64;
        let net = nn::seq()
            .add(nn::linear(p / "l1", input_dim as i64, h, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(p / "l2", h, h, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(p / "l3", h, h, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(
                p / "logits",
                h,
                n_classes as i64,
                Default::default(),
            ));
        let opt = nn::Adam::default().wd(weight_decay).build(&vs, lr.current())?;

        Ok(Self {
            vs,
            net,
            opt,
            lr,
            input_dim,
            n_classes,
            training: false,
        })
    }

    fn input_tensor(&self, input: &[f64]) -> Result<Tensor> {
        if input.len() != self.input_dim {
            return Err(AcquisitionError::DimensionMismatch {
                what: "predictor input",
                expected: self.input_dim,
                actual: input.len(),
            });
        }
        Ok(Tensor::from_slice(input)
            .to_kind(Kind::Float)
            .reshape([1, self.input_dim as i64])
            .to_device(self.vs.device()))
    }

    /// Returns a reference to the variable store.
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl Predictor for MlpPredictor {
    const CHECKPOINT_EXTENSION: &'static str = "ot";

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        let x = self.input_tensor(input)?;
        let probs = tch::no_grad(|| self.net.forward(&x).softmax(-1, Kind::Double));
        Ok(Vec::<f64>::try_from(&probs.flatten(0, -1))?)
    }

    fn update(&mut self, input: &[f64], label: usize) -> Result<f64> {
        let x = self.input_tensor(input)?;
        let target = Tensor::from_slice(&[label as i64]).to_device(self.vs.device());
        let logits = self.net.forward(&x);
        let loss = logits.cross_entropy_for_logits(&target);
        self.opt.backward_step(&loss);
        Ok(f64::try_from(&loss)?)
    }

    fn anneal_learning_rate(&mut self) {
        let lr = self.lr.advance();
        self.opt.set_lr(lr);
    }

    fn set_training_mode(&mut self, training: bool) {
        self.training = training;
    }

    fn save(&self, path: &Path) -> Result<()> {
        Ok(self.vs.save(path)?)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        Ok(self.vs.load(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_is_a_distribution() {
        let model = MlpPredictor::new(6, 16, 3, StepDecay::constant(1e-3), 0.0, Device::Cpu).unwrap();
        let p = model.forward(&[0.0, 1.0, 0.0, 0.5, 0.0, 0.0]).unwrap();
        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn update_returns_finite_loss() {
        let mut model =
            MlpPredictor::new(4, 8, 2, StepDecay::constant(1e-2), 0.0, Device::Cpu).unwrap();
        let loss = model.update(&[1.0, 0.0, 0.0, 1.0], 1).unwrap();
        assert!(loss.is_finite());
    }
}
