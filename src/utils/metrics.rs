//! Metrics Module
//!
//! Per-pass accumulators for the train/evaluate loop and a confusion matrix
//! for the final per-class breakdown.

use serde::{Deserialize, Serialize};

/// Running totals for one pass over a partition
///
/// Reset at the start of every pass: loss is summed per batch, correct and
/// seen counts are summed per sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassTotals {
    loss_sum: f64,
    batches: usize,
    correct: usize,
    samples: usize,
}

impl PassTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch worth of results
    pub fn add_batch(&mut self, loss: f64, correct: usize, samples: usize) {
        self.loss_sum += loss;
        self.batches += 1;
        self.correct += correct;
        self.samples += samples;
    }

    /// Summed loss divided by the number of batches
    pub fn mean_loss(&self) -> f64 {
        if self.batches > 0 {
            self.loss_sum / self.batches as f64
        } else {
            0.0
        }
    }

    /// Correct predictions as a percentage of samples seen
    pub fn accuracy_percent(&self) -> f64 {
        if self.samples > 0 {
            100.0 * self.correct as f64 / self.samples as f64
        } else {
            0.0
        }
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn samples(&self) -> usize {
        self.samples
    }
}

/// Confusion matrix (row = actual, column = predicted), row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Record a batch of (predicted, actual) pairs
    pub fn record(&mut self, predictions: &[usize], targets: &[usize]) {
        for (&predicted, &actual) in predictions.iter().zip(targets) {
            if actual < self.num_classes && predicted < self.num_classes {
                self.matrix[actual * self.num_classes + predicted] += 1;
            }
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Recall of each class in percent; classes with no samples report 0
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        (0..self.num_classes)
            .map(|row| {
                let support: usize = (0..self.num_classes).map(|col| self.get(row, col)).sum();
                if support > 0 {
                    100.0 * self.get(row, row) as f64 / support as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Pretty print with optional class names
    pub fn display(&self, class_names: Option<&[String]>) -> String {
        let label = |i: usize| -> String {
            class_names
                .and_then(|names| names.get(i))
                .map(|n| n.chars().take(8).collect())
                .unwrap_or_else(|| i.to_string())
        };

        let mut output = String::from("Confusion Matrix (rows=actual, cols=predicted):\n");
        output.push_str(&format!("{:>10}", ""));
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>10}", label(col)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>10}", label(row)));
            for col in 0..self.num_classes {
                output.push_str(&format!("{:>10}", self.get(row, col)));
            }
            output.push('\n');
        }

        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_totals_mean_over_batches() {
        let mut totals = PassTotals::new();
        totals.add_batch(0.5, 30, 64);
        totals.add_batch(0.7, 10, 16);

        assert_eq!(totals.batches(), 2);
        assert_eq!(totals.samples(), 80);
        assert!((totals.mean_loss() - 0.6).abs() < 1e-9);
        assert!((totals.accuracy_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_pass_totals_empty() {
        let totals = PassTotals::new();
        assert_eq!(totals.mean_loss(), 0.0);
        assert_eq!(totals.accuracy_percent(), 0.0);
    }

    #[test]
    fn test_confusion_matrix_binary() {
        let mut cm = ConfusionMatrix::new(2);
        cm.record(&[0, 0, 1, 1, 1], &[0, 1, 1, 1, 0]);

        assert_eq!(cm.total(), 5);
        assert_eq!(cm.correct(), 3);
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.get(0, 1), 1);

        let per_class = cm.per_class_accuracy();
        assert!((per_class[0] - 50.0).abs() < 1e-9);
        assert!((per_class[1] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_confusion_matrix_display_uses_names() {
        let mut cm = ConfusionMatrix::new(2);
        cm.record(&[0], &[0]);
        let names = vec!["cats".to_string(), "dogs".to_string()];
        let text = cm.display(Some(names.as_slice()));
        assert!(text.contains("cats"));
        assert!(text.contains("dogs"));
    }
}
