//! Offline predictor pretraining on randomly masked rows.
//!
//! Zeroing features at random simulates the partial observations the
//! predictor sees inside episodes, so it starts from a useful prior before
//! the acquisition agent is trained.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{argmax, Predictor};
use crate::dataset::{Dataset, Partition};
use crate::error::Result;

/// Hyperparameters for [`pretrain_predictor`].
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainConfig {
    pub epochs: usize,
    /// Probability that each feature is zeroed in a training/validation row.
    pub mask_probability: f64,
    /// Epochs between validation passes.
    pub val_interval: usize,
    /// Non-improving validations tolerated before stopping.
    pub patience: usize,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            epochs: 400,
            mask_probability: 0.3,
            val_interval: 10,
            patience: 30,
        }
    }
}

/// Outcome of [`pretrain_predictor`].
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainReport {
    pub epochs_run: usize,
    pub best_val_accuracy: f64,
    pub final_train_loss: f64,
}

/// Zeroes each entry of `row` independently with probability `p`.
pub fn mask_features<R: Rng>(row: &mut [f64], p: f64, rng: &mut R) {
    for value in row.iter_mut() {
        if rng.gen::<f64>() < p {
            *value = 0.0;
        }
    }
}

/// Trains `predictor` on the training partition with feature masking,
/// stopping early on validation accuracy.
pub fn pretrain_predictor<P: Predictor, R: Rng>(
    predictor: &mut P,
    dataset: &Dataset,
    config: &PretrainConfig,
    rng: &mut R,
) -> Result<PretrainReport> {
    let mut best_val_accuracy = 0.0;
    let mut trials_without_improvement = 0;
    let mut final_train_loss = 0.0;
    let mut epochs_run = 0;
    let mut order: Vec<usize> = (0..dataset.train.len()).collect();

    for epoch in 1..=config.epochs {
        epochs_run = epoch;
        order.shuffle(rng);
        predictor.set_training_mode(true);

        let mut total_loss = 0.0;
        for &i in &order {
            let mut row = dataset.train.features[i].clone();
            mask_features(&mut row, config.mask_probability, rng);
            total_loss += predictor.update(&row, dataset.train.labels[i])?;
        }
        final_train_loss = total_loss / order.len().max(1) as f64;

        if config.val_interval > 0 && epoch % config.val_interval == 0 {
            let accuracy = masked_accuracy(predictor, &dataset.val, config.mask_probability, rng)?;
            tracing::info!(epoch, accuracy, loss = final_train_loss, "predictor validation");
            if accuracy > best_val_accuracy {
                best_val_accuracy = accuracy;
                trials_without_improvement = 0;
            } else {
                trials_without_improvement += 1;
            }
            if trials_without_improvement >= config.patience {
                tracing::info!(
                    trials = config.patience,
                    "no validation improvement, predictor pretraining done"
                );
                break;
            }
        }
    }

    predictor.set_training_mode(false);
    Ok(PretrainReport {
        epochs_run,
        best_val_accuracy,
        final_train_loss,
    })
}

/// Accuracy of `predictor` on `partition` with each row randomly masked.
pub fn masked_accuracy<P: Predictor, R: Rng>(
    predictor: &mut P,
    partition: &Partition,
    mask_probability: f64,
    rng: &mut R,
) -> Result<f64> {
    if partition.is_empty() {
        return Ok(0.0);
    }
    predictor.set_training_mode(false);
    let mut correct = 0usize;
    for (row, &label) in partition.features.iter().zip(&partition.labels) {
        let mut row = row.clone();
        mask_features(&mut row, mask_probability, rng);
        if argmax(&predictor.forward(&row)?) == label {
            correct += 1;
        }
    }
    Ok(correct as f64 / partition.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::SoftmaxRegression;
    use crate::schedule::StepDecay;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn separable_dataset() -> Dataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let label = i % 2;
            let sign = if label == 1 { 1.0 } else { -1.0 };
            features.push(vec![sign, sign * 0.5, 0.1 * (i % 5) as f64]);
            labels.push(label);
        }
        let mut rng = StdRng::seed_from_u64(9);
        Dataset::split(
            features,
            labels,
            2,
            crate::dataset::SplitConfig {
                test_fraction: 0.2,
                val_fraction: 0.2,
            },
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn mask_probability_zero_keeps_row() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut row = vec![1.0, 2.0, 3.0];
        mask_features(&mut row, 0.0, &mut rng);
        assert_eq!(row, vec![1.0, 2.0, 3.0]);
        mask_features(&mut row, 1.0, &mut rng);
        assert_eq!(row, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn pretraining_learns_separable_data() {
        let ds = separable_dataset();
        let mut model = SoftmaxRegression::new(3, 2, StepDecay::constant(0.2), 0.0);
        let mut rng = StdRng::seed_from_u64(4);
        let config = PretrainConfig {
            epochs: 30,
            mask_probability: 0.0,
            val_interval: 5,
            patience: 100,
        };
        let report = pretrain_predictor(&mut model, &ds, &config, &mut rng).unwrap();
        assert_eq!(report.epochs_run, 30);
        assert_eq!(report.best_val_accuracy, 1.0);
        assert!(!model.is_training());
    }

    #[test]
    fn pretraining_stops_on_patience() {
        let ds = separable_dataset();
        let mut model = SoftmaxRegression::new(3, 2, StepDecay::constant(0.2), 0.0);
        let mut rng = StdRng::seed_from_u64(4);
        let config = PretrainConfig {
            epochs: 500,
            mask_probability: 0.0,
            val_interval: 1,
            patience: 3,
        };
        let report = pretrain_predictor(&mut model, &ds, &config, &mut rng).unwrap();
        // Perfect accuracy is reached quickly and cannot improve afterwards.
        assert!(report.epochs_run < 500);
    }
}
