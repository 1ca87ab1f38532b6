//! MLP action-value network using tch-rs.
//!
//! This module is only available with the `nn` feature.

use std::path::Path;

use tch::{nn, nn::Module, nn::OptimizerConfig, Device, Kind, Reduction, Tensor};

use super::QFunction;
use crate::error::{AcquisitionError, Result};
use crate::schedule::StepDecay;

/// MLP Q-network.
///
/// Architecture: `state_dim → h → h → n_actions` with ReLU activations and a
/// linear output head. Trained with Adam on mean-squared error.
pub struct MlpQFunction {
    vs: nn::VarStore,
    net: nn::Sequential,
    opt: nn::Optimizer,
    lr: StepDecay,
    input_dim: usize,
    n_actions: usize,
}

impl MlpQFunction {
    /// Creates a new Q-network.
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        n_actions: usize,
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
            .add(nn::linear(p / "l3", h, n_actions as i64, Default::default()));
        let opt = nn::Adam::default().wd(weight_decay).build(&vs, lr.current())?;

        Ok(Self {
            vs,
            net,
            opt,
            lr,
            input_dim,
            n_actions,
        })
    }

    fn batch_tensor<S: AsRef<[f64]>>(&self, rows: &[S], width: usize) -> Result<Tensor> {
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return Err(AcquisitionError::DimensionMismatch {
                    what: "q-function batch row",
                    expected: width,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        Ok(Tensor::from_slice(&flat)
            .to_kind(Kind::Float)
            .reshape([rows.len() as i64, width as i64])
            .to_device(self.vs.device()))
    }

    /// Returns a reference to the variable store.
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl QFunction for MlpQFunction {
    const CHECKPOINT_EXTENSION: &'static str = "ot";

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn forward<S: AsRef<[f64]>>(&self, states: &[S]) -> Result<Vec<Vec<f64>>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.batch_tensor(states, self.input_dim)?;
        let q = tch::no_grad(|| self.net.forward(&x).to_kind(Kind::Double));
        let flat = Vec::<f64>::try_from(&q.flatten(0, -1))?;
        Ok(flat.chunks(self.n_actions).map(<[f64]>::to_vec).collect())
    }

    fn train<S: AsRef<[f64]>>(&mut self, states: &[S], q_target: &[Vec<f64>]) -> Result<f64> {
        if states.len() != q_target.len() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "q-target batch",
                expected: states.len(),
                actual: q_target.len(),
            });
        }
        if states.is_empty() {
            return Ok(0.0);
        }
        let x = self.batch_tensor(states, self.input_dim)?;
        let target = self.batch_tensor(q_target, self.n_actions)?;
        let q_pred = self.net.forward(&x);
        let loss = q_pred.mse_loss(&target, Reduction::Mean);
        self.opt.backward_step(&loss);
        Ok(f64::try_from(&loss)?)
    }

    fn copy_from(&mut self, other: &Self) -> Result<()> {
        Ok(self.vs.copy(&other.vs)?)
    }

    fn anneal_learning_rate(&mut self) {
        let lr = self.lr.advance();
        self.opt.set_lr(lr);
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

    fn net() -> MlpQFunction {
        MlpQFunction::new(10, 32, 6, StepDecay::constant(1e-3), 0.0, Device::Cpu).unwrap()
    }

    #[test]
    fn forward_shape() {
        let q = net().forward(&vec![vec![0.5; 10]; 4]).unwrap();
        assert_eq!(q.len(), 4);
        assert!(q.iter().all(|row| row.len() == 6));
    }

    #[test]
    fn copy_from_matches_outputs() {
        let online = net();
        let mut target = net();
        target.copy_from(&online).unwrap();
        let s = vec![vec![0.25; 10]];
        let a = online.forward(&s).unwrap();
        let b = target.forward(&s).unwrap();
        for (x, y) in a[0].iter().zip(&b[0]) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
