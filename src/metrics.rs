//! Evaluation metrics for validation and test passes.

use std::fmt;

use crate::types::Mode;

/// Square count matrix indexed `[true class][predicted class]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Creates an empty `n_classes × n_classes` matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            counts: vec![vec![0; n_classes]; n_classes],
        }
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    /// Records one scored instance. Out-of-range classes are ignored.
    pub fn record(&mut self, truth: usize, predicted: usize) {
        if let Some(cell) = self
            .counts
            .get_mut(truth)
            .and_then(|row| row.get_mut(predicted))
        {
            *cell += 1;
        }
    }

    /// Number of instances of class `truth` predicted as `predicted`.
    pub fn count(&self, truth: usize, predicted: usize) -> usize {
        self.counts
            .get(truth)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    /// Number of recorded instances.
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Trace of the matrix.
    pub fn correct(&self) -> usize {
        (0..self.n_classes()).map(|c| self.counts[c][c]).sum()
    }

    /// `trace / total`, or 0 for an empty matrix.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Rows indexed by true class, columns by predicted class.
    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  true\\pred")?;
        for c in 0..self.n_classes() {
            write!(f, " {c:>6}")?;
        }
        writeln!(f)?;
        for (truth, row) in self.counts.iter().enumerate() {
            write!(f, "  {truth:>9}")?;
            for n in row {
                write!(f, " {n:>6}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Outcome of a greedy pass over a validation or test partition.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub mode: Mode,
    /// Number of instances scored.
    pub episodes: usize,
    pub accuracy: f64,
    /// Mean steps per instance; forced guesses count their extra step.
    pub average_steps: f64,
    /// Instances whose budget ran out and needed a forced guess.
    pub forced_guesses: usize,
    pub confusion: ConfusionMatrix,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Evaluation ({}, {} instances) ===",
            self.mode, self.episodes
        )?;
        writeln!(f, "  Accuracy:          {:.4}", self.accuracy)?;
        writeln!(f, "  Average steps:     {:.2}", self.average_steps)?;
        writeln!(f, "  Forced guesses:    {}", self.forced_guesses)?;
        write!(f, "{}", self.confusion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_is_trace_over_total() {
        let mut m = ConfusionMatrix::new(3);
        m.record(0, 0);
        m.record(1, 1);
        m.record(2, 0);
        m.record(2, 2);
        assert_eq!(m.total(), 4);
        assert_eq!(m.correct(), 3);
        assert_eq!(m.accuracy(), 0.75);
        assert_eq!(m.count(2, 0), 1);
    }

    #[test]
    fn empty_matrix_has_zero_accuracy() {
        assert_eq!(ConfusionMatrix::new(2).accuracy(), 0.0);
    }

    #[test]
    fn out_of_range_records_are_dropped() {
        let mut m = ConfusionMatrix::new(2);
        m.record(5, 0);
        m.record(0, 9);
        assert_eq!(m.total(), 0);
    }

    #[test]
    fn report_display_mentions_mode_and_accuracy() {
        let mut confusion = ConfusionMatrix::new(2);
        confusion.record(0, 0);
        confusion.record(1, 0);
        let report = EvaluationReport {
            mode: Mode::Test,
            episodes: 2,
            accuracy: confusion.accuracy(),
            average_steps: 3.5,
            forced_guesses: 1,
            confusion,
        };
        let text = report.to_string();
        assert!(text.contains("test, 2 instances"));
        assert!(text.contains("0.5000"));
        assert!(text.contains("3.50"));
    }
}
