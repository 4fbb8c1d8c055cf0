//! Held-out evaluation: confusion matrix and per-class report

use std::fmt;

use crate::utils::math::{f1, safe_div};

/// Confusion matrix, rows are true labels and columns are predictions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    labels: Vec<usize>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from parallel slices of true and predicted labels
    ///
    /// The label set is the sorted union of both slices.
    pub fn new(truth: &[usize], predicted: &[usize]) -> Self {
        let mut labels: Vec<usize> = truth.iter().chain(predicted.iter()).copied().collect();
        labels.sort_unstable();
        labels.dedup();

        let mut counts = vec![vec![0usize; labels.len()]; labels.len()];
        for (t, p) in truth.iter().zip(predicted.iter()) {
            // Both are in `labels` by construction
            let row = labels.binary_search(t).unwrap_or_default();
            let col = labels.binary_search(p).unwrap_or_default();
            counts[row][col] += 1;
        }

        Self { labels, counts }
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Count of samples with true label `truth` predicted as `predicted`
    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        match (self.labels.binary_search(&truth), self.labels.binary_search(&predicted)) {
            (Ok(row), Ok(col)) => self.counts[row][col],
            _ => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.labels.len()).map(|i| self.counts[i][i]).sum();
        safe_div(correct as f64, self.total() as f64)
    }

    fn class_metrics(&self, idx: usize) -> ClassMetrics {
        let tp = self.counts[idx][idx] as f64;
        let predicted: usize = self.counts.iter().map(|row| row[idx]).sum();
        let support: usize = self.counts[idx].iter().sum();

        let precision = safe_div(tp, predicted as f64);
        let recall = safe_div(tp, support as f64);

        ClassMetrics {
            label: self.labels[idx],
            precision,
            recall,
            f1: f1(precision, recall),
            support,
        }
    }

    /// Per-class precision / recall / f1 plus averages
    pub fn report(&self) -> ClassificationReport {
        let classes: Vec<ClassMetrics> =
            (0..self.labels.len()).map(|i| self.class_metrics(i)).collect();
        let total = self.total();

        let n = classes.len() as f64;
        let macro_avg = Averages {
            precision: safe_div(classes.iter().map(|c| c.precision).sum(), n),
            recall: safe_div(classes.iter().map(|c| c.recall).sum(), n),
            f1: safe_div(classes.iter().map(|c| c.f1).sum(), n),
        };

        let weighted = |value: fn(&ClassMetrics) -> f64| {
            safe_div(
                classes.iter().map(|c| value(c) * c.support as f64).sum(),
                total as f64,
            )
        };
        let weighted_avg = Averages {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
        };

        ClassificationReport {
            accuracy: self.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
            total,
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for label in &self.labels {
            write!(f, "{:>8}", format!("pred {}", label))?;
        }
        writeln!(f)?;
        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{:>8}", format!("true {}", label))?;
            for count in row {
                write!(f, "{:>8}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Averages {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: Averages,
    pub weighted_avg: Averages,
    pub total: usize,
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14}{:>11}{:>10}{:>10}{:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14}{:>11.2}{:>10.2}{:>10.2}{:>10}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14}{:>11}{:>10}{:>10.2}{:>10}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14}{:>11.2}{:>10.2}{:>10.2}{:>10}",
                name, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        Ok(())
    }
}
