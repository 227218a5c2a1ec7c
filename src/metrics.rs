// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Binary classification metrics
//!
//! Implements:
//! - Confusion matrix at the fixed decision threshold
//! - Accuracy, per-class precision and recall, F1
//! - AUC-ROC (rank based, tied scores count one half)
//! - Area under the precision-recall curve
//! - Log loss and log-loss reduction over the label prior

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Probabilities are clamped away from 0 and 1 before taking logs
const LOG_EPSILON: f64 = 1e-15;

/// Confusion matrix; positive sentiment is the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Positive reviews predicted positive
    pub tp: usize,
    /// Negative reviews predicted negative
    pub tn: usize,
    /// Negative reviews predicted positive
    pub fp: usize,
    /// Positive reviews predicted negative
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[bool], ground_truth: &[bool]) -> Self {
        let mut matrix = Self::default();
        for (pred, truth) in predictions.iter().zip(ground_truth) {
            match (pred, truth) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.fn_ += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Negative precision: TN / (TN + FN)
    pub fn negative_precision(&self) -> f64 {
        ratio(self.tn, self.tn + self.fn_)
    }

    /// Negative recall (specificity): TN / (TN + FP)
    pub fn negative_recall(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

/// Metrics of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryClassificationMetrics {
    pub accuracy: f64,
    pub auc: f64,
    pub f1_score: f64,
    pub positive_precision: f64,
    pub positive_recall: f64,
    pub negative_precision: f64,
    pub negative_recall: f64,
    pub log_loss: f64,
    /// Relative improvement of log loss over always predicting the label prior
    pub log_loss_reduction: f64,
    /// Area under the precision-recall curve
    pub auprc: f64,
    pub confusion_matrix: ConfusionMatrix,
}

impl BinaryClassificationMetrics {
    /// Compute all metrics. Both classes must be present in `ground_truth`.
    pub fn compute(ground_truth: &[bool], predictions: &[bool], probabilities: &[f64]) -> Result<Self> {
        if ground_truth.len() != predictions.len() || ground_truth.len() != probabilities.len() {
            return Err(Error::config(format!(
                "metric inputs differ in length: {} labels, {} predictions, {} probabilities",
                ground_truth.len(),
                predictions.len(),
                probabilities.len()
            )));
        }
        let n_pos = ground_truth.iter().filter(|l| **l).count();
        let n_neg = ground_truth.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(Error::config(
                "evaluation set must contain both positive and negative examples",
            ));
        }
        if let Some(p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(Error::config(format!("probability {p} outside [0, 1]")));
        }

        let cm = ConfusionMatrix::from_predictions(predictions, ground_truth);
        let log_loss = log_loss(ground_truth, probabilities);
        let prior = n_pos as f64 / ground_truth.len() as f64;
        let prior_loss = -(prior * prior.ln() + (1.0 - prior) * (1.0 - prior).ln());

        Ok(Self {
            accuracy: cm.accuracy(),
            auc: auc_roc(ground_truth, probabilities),
            f1_score: cm.f1_score(),
            positive_precision: cm.precision(),
            positive_recall: cm.recall(),
            negative_precision: cm.negative_precision(),
            negative_recall: cm.negative_recall(),
            log_loss,
            log_loss_reduction: (prior_loss - log_loss) / prior_loss,
            auprc: average_precision(ground_truth, probabilities),
            confusion_matrix: cm,
        })
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        format!(
            r#"Model quality metrics evaluation
--------------------------------
Accuracy:           {:.2}%
AUC:                {:.2}%
F1 Score:           {:.2}%
AUPRC:              {:.4}
Positive Precision: {:.4}
Positive Recall:    {:.4}
Negative Precision: {:.4}
Negative Recall:    {:.4}
Log Loss:           {:.4}
Log Loss Reduction: {:.4}

Confusion Matrix:
                  Predicted
                  Positive  Negative
Actual Positive  {:>6}    {:>6}
       Negative  {:>6}    {:>6}
"#,
            self.accuracy * 100.0,
            self.auc * 100.0,
            self.f1_score * 100.0,
            self.auprc,
            self.positive_precision,
            self.positive_recall,
            self.negative_precision,
            self.negative_recall,
            self.log_loss,
            self.log_loss_reduction,
            self.confusion_matrix.tp,
            self.confusion_matrix.fn_,
            self.confusion_matrix.fp,
            self.confusion_matrix.tn,
        )
    }
}

/// Mean negative log-likelihood of the true labels
fn log_loss(ground_truth: &[bool], probabilities: &[f64]) -> f64 {
    let sum: f64 = ground_truth
        .iter()
        .zip(probabilities)
        .map(|(label, p)| {
            let p = p.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
            if *label {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    sum / ground_truth.len() as f64
}

/// Mann-Whitney AUC with average ranks for tied scores
fn auc_roc(ground_truth: &[bool], probabilities: &[f64]) -> f64 {
    let mut pairs: Vec<(f64, bool)> = probabilities.iter().copied().zip(ground_truth.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n_pos = ground_truth.iter().filter(|l| **l).count() as f64;
    let n_neg = ground_truth.len() as f64 - n_pos;

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < pairs.len() {
        let mut end = start;
        while end < pairs.len() && pairs[end].0 == pairs[start].0 {
            end += 1;
        }
        // Ranks are 1-based; the group covers ranks start+1..=end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let positives = pairs[start..end].iter().filter(|(_, l)| *l).count() as f64;
        positive_rank_sum += average_rank * positives;
        start = end;
    }

    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Step-wise area under the precision-recall curve; tied scores form one step
fn average_precision(ground_truth: &[bool], probabilities: &[f64]) -> f64 {
    let mut pairs: Vec<(f64, bool)> = probabilities.iter().copied().zip(ground_truth.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let n_pos = ground_truth.iter().filter(|l| **l).count() as f64;
    let (mut tp, mut fp) = (0.0, 0.0);
    let mut prev_recall = 0.0;
    let mut ap = 0.0;

    let mut start = 0;
    while start < pairs.len() {
        let mut end = start;
        while end < pairs.len() && pairs[end].0 == pairs[start].0 {
            if pairs[end].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            end += 1;
        }
        let recall = tp / n_pos;
        let precision = tp / (tp + fp);
        ap += precision * (recall - prev_recall);
        prev_recall = recall;
        start = end;
    }

    ap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_confusion_matrix_perfect() {
        let truth = [true, true, false, false];
        let cm = ConfusionMatrix::from_predictions(&truth, &truth);

        assert_eq!(cm.tp, 2);
        assert_eq!(cm.tn, 2);
        assert_eq!(cm.fp, 0);
        assert_eq!(cm.fn_, 0);
        assert!((cm.accuracy() - 1.0).abs() < 1e-6);
        assert!((cm.f1_score() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_confusion_matrix_mixed() {
        let predictions = [true, false, true, false];
        let truth = [true, true, false, false];
        let cm = ConfusionMatrix::from_predictions(&predictions, &truth);

        assert_eq!((cm.tp, cm.tn, cm.fp, cm.fn_), (1, 1, 1, 1));
        assert!((cm.accuracy() - 0.5).abs() < 1e-6);
        assert!((cm.negative_precision() - 0.5).abs() < 1e-6);
        assert!((cm.negative_recall() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let truth = [true, true, false, false];
        assert!((auc_roc(&truth, &[0.9, 0.8, 0.2, 0.1]) - 1.0).abs() < 1e-12);
        assert!(auc_roc(&truth, &[0.1, 0.2, 0.8, 0.9]).abs() < 1e-12);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let truth = [true, false];
        assert!((auc_roc(&truth, &[0.5, 0.5]) - 0.5).abs() < 1e-12);

        // One positive above both negatives, one tied with a negative
        let truth = [true, true, false, false];
        let auc = auc_roc(&truth, &[0.9, 0.4, 0.4, 0.1]);
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_average_precision() {
        let truth = [true, false, true, false];
        let ap = average_precision(&truth, &[0.9, 0.8, 0.7, 0.1]);
        // 1.0 * 0.5 + (2/3) * 0.5
        assert!((ap - (0.5 + 1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_compute_bounds_and_log_loss() {
        let truth = [true, true, false, false];
        let probs = [0.9, 0.6, 0.4, 0.2];
        let predicted: Vec<bool> = probs.iter().map(|p| *p >= 0.5).collect();
        let metrics = BinaryClassificationMetrics::compute(&truth, &predicted, &probs).unwrap();

        assert!((metrics.accuracy - 1.0).abs() < 1e-12);
        assert!((metrics.auc - 1.0).abs() < 1e-12);
        assert!((metrics.f1_score - 1.0).abs() < 1e-12);
        let expected = -(0.9f64.ln() + 0.6f64.ln() + 0.6f64.ln() + 0.8f64.ln()) / 4.0;
        assert!((metrics.log_loss - expected).abs() < 1e-12);
        assert!(metrics.log_loss_reduction > 0.0);
        for value in [metrics.accuracy, metrics.auc, metrics.f1_score, metrics.auprc] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(metrics.format().contains("Accuracy"));
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        let err = BinaryClassificationMetrics::compute(&[true, true], &[true, true], &[0.9, 0.8]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = BinaryClassificationMetrics::compute(&[true, false], &[true], &[0.9, 0.1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = BinaryClassificationMetrics::compute(&[true, false], &[true, false], &[1.5, 0.1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
