//! Instances and their train / validation / test partitions.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{AcquisitionError, Result};
use crate::types::Mode;

/// Fractions used by [`Dataset::split`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Share of all rows held out for testing.
    pub test_fraction: f64,
    /// Share of the remaining rows held out for validation.
    pub val_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            val_fraction: 0.05,
        }
    }
}

/// Row-major feature matrix with one class label per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl Partition {
    /// Pairs rows with their labels.
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<usize>) -> Self {
        Self { features, labels }
    }

    /// Returns the number of instances.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the partition has no instances.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the feature row and label of instance `index`.
    pub fn instance(&self, index: usize) -> Option<(&[f64], usize)> {
        Some((self.features.get(index)?.as_slice(), *self.labels.get(index)?))
    }

    /// Duplicates random rows of every smaller class until each class has as
    /// many rows as the largest one.
    pub fn oversample_minority<R: Rng>(&mut self, rng: &mut R) {
        let mut by_class: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, &label) in self.labels.iter().enumerate() {
            by_class.entry(label).or_default().push(i);
        }
        let majority = by_class.values().map(Vec::len).max().unwrap_or(0);

        let mut classes: Vec<_> = by_class.into_iter().collect();
        classes.sort_by_key(|(label, _)| *label);
        for (label, rows) in classes {
            for _ in rows.len()..majority {
                if let Some(&row) = rows.choose(rng) {
                    self.features.push(self.features[row].clone());
                    self.labels.push(label);
                }
            }
        }
    }

    fn select(&self, rows: &[usize]) -> Partition {
        Partition {
            features: rows.iter().map(|&i| self.features[i].clone()).collect(),
            labels: rows.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// A fixed train / validation / test split over F features and C classes.
///
/// Immutable once built; the environment only reads from it.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Partition,
    pub val: Partition,
    pub test: Partition,
    n_features: usize,
    n_classes: usize,
    feature_names: Vec<String>,
}

impl Dataset {
    /// Builds a dataset from already-partitioned data.
    ///
    /// Fails if any row has the wrong width, any label is `>= n_classes`, or
    /// the training partition is empty.
    pub fn new(
        train: Partition,
        val: Partition,
        test: Partition,
        n_features: usize,
        n_classes: usize,
    ) -> Result<Self> {
        if n_features == 0 || n_classes < 2 {
            return Err(AcquisitionError::InvalidDataset(format!(
                "need at least one feature and two classes, got {n_features} features and {n_classes} classes"
            )));
        }
        for (mode, partition) in [(Mode::Training, &train), (Mode::Validation, &val), (Mode::Test, &test)] {
            Self::check_partition(mode, partition, n_features, n_classes)?;
        }
        if train.is_empty() {
            return Err(AcquisitionError::InvalidDataset(
                "training partition is empty".into(),
            ));
        }
        Ok(Self {
            train,
            val,
            test,
            n_features,
            n_classes,
            feature_names: (0..n_features).map(|i| format!("feature_{i}")).collect(),
        })
    }

    /// Shuffles all rows, holds out `test_fraction` for testing, then
    /// `val_fraction` of the remainder for validation.
    pub fn split<R: Rng>(
        features: Vec<Vec<f64>>,
        labels: Vec<usize>,
        n_classes: usize,
        split: SplitConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(AcquisitionError::DimensionMismatch {
                what: "labels",
                expected: features.len(),
                actual: labels.len(),
            });
        }
        let n_features = features.first().map(Vec::len).unwrap_or(0);
        let all = Partition::new(features, labels);

        let mut order: Vec<usize> = (0..all.len()).collect();
        order.shuffle(rng);

        let n_test = (all.len() as f64 * split.test_fraction).round() as usize;
        let (test_rows, rest) = order.split_at(n_test.min(order.len()));
        let n_val = (rest.len() as f64 * split.val_fraction).round() as usize;
        let (val_rows, train_rows) = rest.split_at(n_val.min(rest.len()));

        Self::new(
            all.select(train_rows),
            all.select(val_rows),
            all.select(test_rows),
            n_features,
            n_classes,
        )
    }

    /// Attaches human-readable feature names used in episode traces.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.n_features {
            return Err(AcquisitionError::DimensionMismatch {
                what: "feature names",
                expected: self.n_features,
                actual: names.len(),
            });
        }
        self.feature_names = names;
        Ok(self)
    }

    /// The partition episodes of `mode` draw from.
    pub fn partition(&self, mode: Mode) -> &Partition {
        match mode {
            Mode::Training => &self.train,
            Mode::Validation => &self.val,
            Mode::Test => &self.test,
        }
    }

    /// Number of features per instance.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Name of `feature`, if names were attached.
    pub fn feature_name(&self, feature: usize) -> Option<&str> {
        self.feature_names.get(feature).map(String::as_str)
    }

    fn check_partition(
        mode: Mode,
        partition: &Partition,
        n_features: usize,
        n_classes: usize,
    ) -> Result<()> {
        if partition.features.len() != partition.labels.len() {
            return Err(AcquisitionError::InvalidDataset(format!(
                "{mode} partition has {} rows but {} labels",
                partition.features.len(),
                partition.labels.len()
            )));
        }
        if let Some(row) = partition.features.iter().find(|r| r.len() != n_features) {
            return Err(AcquisitionError::DimensionMismatch {
                what: "feature row",
                expected: n_features,
                actual: row.len(),
            });
        }
        if let Some(&label) = partition.labels.iter().find(|&&l| l >= n_classes) {
            return Err(AcquisitionError::InvalidDataset(format!(
                "{mode} label {label} is not below class count {n_classes}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rows(n: usize, width: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
        let features = (0..n).map(|i| vec![i as f64; width]).collect();
        let labels = (0..n).map(|i| i % 2).collect();
        (features, labels)
    }

    #[test]
    fn split_sizes_follow_fractions() {
        let (x, y) = rows(100, 3);
        let mut rng = StdRng::seed_from_u64(7);
        let ds = Dataset::split(x, y, 2, SplitConfig::default(), &mut rng).unwrap();
        assert_eq!(ds.test.len(), 30);
        assert_eq!(ds.val.len(), 4); // round(70 * 0.05)
        assert_eq!(ds.train.len(), 66);
        assert_eq!(ds.n_features(), 3);
    }

    #[test]
    fn split_keeps_rows_paired_with_labels() {
        let (x, y) = rows(40, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let ds = Dataset::split(x, y, 2, SplitConfig::default(), &mut rng).unwrap();
        for mode in Mode::all() {
            let p = ds.partition(mode);
            for i in 0..p.len() {
                let (row, label) = p.instance(i).unwrap();
                assert_eq!(row[0] as usize % 2, label);
            }
        }
    }

    #[test]
    fn rejects_ragged_rows() {
        let train = Partition::new(vec![vec![1.0, 2.0], vec![1.0]], vec![0, 1]);
        let err = Dataset::new(train, Partition::default(), Partition::default(), 2, 2);
        assert!(matches!(
            err,
            Err(AcquisitionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn rejects_label_out_of_range() {
        let train = Partition::new(vec![vec![1.0]], vec![3]);
        let err = Dataset::new(train, Partition::default(), Partition::default(), 1, 2);
        assert!(matches!(err, Err(AcquisitionError::InvalidDataset(_))));
    }

    #[test]
    fn oversampling_balances_classes() {
        let mut p = Partition::new(
            vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
            vec![0, 0, 0, 0, 1],
        );
        let mut rng = StdRng::seed_from_u64(3);
        p.oversample_minority(&mut rng);
        assert_eq!(p.len(), 8);
        assert_eq!(p.labels.iter().filter(|&&l| l == 1).count(), 4);
        for (row, &label) in p.features.iter().zip(&p.labels) {
            if label == 1 {
                assert_eq!(row[0], 4.0);
            }
        }
    }

    #[test]
    fn feature_names_must_match_width() {
        let train = Partition::new(vec![vec![1.0, 2.0]], vec![0]);
        let ds = Dataset::new(train, Partition::default(), Partition::default(), 2, 2).unwrap();
        assert_eq!(ds.feature_name(1), Some("feature_1"));
        let ds = ds
            .with_feature_names(vec!["age".into(), "bmi".into()])
            .unwrap();
        assert_eq!(ds.feature_name(0), Some("age"));
        assert!(ds.with_feature_names(vec!["x".into()]).is_err());
    }
}
