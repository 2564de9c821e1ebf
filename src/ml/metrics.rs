//! Evaluation metrics for binary conversion classifiers.

use serde::{Deserialize, Serialize};

/// Confusion counts for a binary classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positive: u32,
    pub false_positive: u32,
    pub true_negative: u32,
    pub false_negative: u32,
}

impl ConfusionMatrix {
    pub fn add(&mut self, truth: bool, predicted: bool) {
        let slot = match (truth, predicted) {
            (true, true) => &mut self.true_positive,
            (false, true) => &mut self.false_positive,
            (false, false) => &mut self.true_negative,
            (true, false) => &mut self.false_negative,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

/// Metrics reported when evaluating a trained model on a labeled set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Absent when the labels contain a single class.
    pub roc_auc: Option<f64>,
    pub support: usize,
}

impl EvaluationMetrics {
    /// Compute all metrics from probabilities thresholded at `p > 0.5`.
    pub fn from_scores(labels: &[bool], scores: &[f64]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&truth, &score) in labels.iter().zip(scores) {
            cm.add(truth, score > 0.5);
        }
        let precision = precision(&cm);
        let recall = recall(&cm);
        Self {
            accuracy: accuracy(&cm),
            precision,
            recall,
            f1: f1(precision, recall),
            roc_auc: roc_auc(labels, scores),
            support: cm.total() as usize,
        }
    }
}

/// `(TP + TN) / total`, zero for an empty matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    ratio(cm.true_positive + cm.true_negative, cm.total())
}

/// `TP / (TP + FP)`, zero when nothing was predicted positive.
pub fn precision(cm: &ConfusionMatrix) -> f64 {
    ratio(cm.true_positive, cm.true_positive + cm.false_positive)
}

/// `TP / (TP + FN)`, zero when there are no positives.
pub fn recall(cm: &ConfusionMatrix) -> f64 {
    ratio(cm.true_positive, cm.true_positive + cm.false_negative)
}

pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let n = labels.len().min(scores.len());
    let positives = labels[..n].iter().filter(|&&y| y).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0f64;
    let mut start = 0usize;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied block shares the mean rank.
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        rank_sum += mean_rank * order[start..end].iter().filter(|&&i| labels[i]).count() as f64;
        start = end;
    }
    let pos = positives as f64;
    Some((rank_sum - pos * (pos + 1.0) / 2.0) / (pos * negatives as f64))
}

fn ratio(num: u32, den: u32) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_based_metrics() {
        let labels = [true, true, false, false, true];
        let scores = [0.9, 0.4, 0.6, 0.1, 0.8];
        let metrics = EvaluationMetrics::from_scores(&labels, &scores);
        assert_eq!(metrics.support, 5);
        assert!((metrics.accuracy - 0.6).abs() < 1e-12);
        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn zero_division_yields_zero() {
        let cm = ConfusionMatrix {
            true_negative: 3,
            ..ConfusionMatrix::default()
        };
        assert_eq!(precision(&cm), 0.0);
        assert_eq!(recall(&cm), 0.0);
        assert_eq!(f1(0.0, 0.0), 0.0);
        assert_eq!(accuracy(&ConfusionMatrix::default()), 0.0);
    }

    #[test]
    fn auc_handles_perfect_random_and_ties() {
        assert_eq!(roc_auc(&[false, false, true, true], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[true, true, false, false], &[0.1, 0.2, 0.8, 0.9]), Some(0.0));
        assert_eq!(roc_auc(&[true, false], &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.9]), None);
    }
}
