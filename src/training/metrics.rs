//! Classification metrics
//!
//! Probabilities are thresholded with a strict cutoff, then scored with
//! macro-averaged precision/recall/F1, per-category F1, and the exact-match
//! ratio. Any ratio with a zero denominator scores 0 instead of poisoning
//! the averages.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::{RiskCategory, N_RISK_CATEGORIES};

/// Aggregate evaluation scores for one prediction batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Macro-averaged precision over the six categories.
    pub precision: f64,
    /// Macro-averaged recall over the six categories.
    pub recall: f64,
    /// Macro-averaged F1 over the six categories.
    pub f1: f64,
    /// Fraction of rows whose full label vector was predicted correctly.
    pub exact_match: f64,
    /// Per-category F1 in label-vector order.
    pub per_class_f1: [f64; N_RISK_CATEGORIES],
}

impl EvalMetrics {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "precision {:.3} | recall {:.3} | f1 {:.3} | exact match {:.3}",
            self.precision, self.recall, self.f1, self.exact_match
        )
    }

    /// Per-category F1 table, one `name: score` line per category.
    pub fn per_class_table(&self) -> String {
        RiskCategory::ALL
            .iter()
            .zip(self.per_class_f1.iter())
            .map(|(category, f1)| format!("{:>8}: {:.3}", category.short_name(), f1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Score thresholded predictions against 0/1 targets.
///
/// A probability counts as positive only when strictly above `threshold`.
pub fn evaluate(probabilities: &Array2<f64>, targets: &Array2<f64>, threshold: f64) -> EvalMetrics {
    let n_rows = probabilities.nrows();
    let n_classes = probabilities.ncols().min(N_RISK_CATEGORIES);

    let mut per_class_precision = [0.0; N_RISK_CATEGORIES];
    let mut per_class_recall = [0.0; N_RISK_CATEGORIES];
    let mut per_class_f1 = [0.0; N_RISK_CATEGORIES];

    for class in 0..n_classes {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for row in 0..n_rows {
            let predicted = probabilities[[row, class]] > threshold;
            let actual = targets[[row, class]] > 0.5;
            match (predicted, actual) {
                (true, true) => tp += 1.0,
                (true, false) => fp += 1.0,
                (false, true) => fn_ += 1.0,
                (false, false) => {}
            }
        }

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        per_class_precision[class] = precision;
        per_class_recall[class] = recall;
        per_class_f1[class] = ratio(2.0 * precision * recall, precision + recall);
    }

    let mut exact = 0usize;
    for row in 0..n_rows {
        let all_match = (0..n_classes).all(|class| {
            (probabilities[[row, class]] > threshold) == (targets[[row, class]] > 0.5)
        });
        if all_match {
            exact += 1;
        }
    }

    let k = n_classes as f64;
    EvalMetrics {
        precision: per_class_precision[..n_classes].iter().sum::<f64>() / k,
        recall: per_class_recall[..n_classes].iter().sum::<f64>() / k,
        f1: per_class_f1[..n_classes].iter().sum::<f64>() / k,
        exact_match: ratio(exact as f64, n_rows as f64),
        per_class_f1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_perfect_predictions() {
        let targets = array![
            [1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
        ];
        let probabilities = targets.mapv(|t| if t > 0.5 { 0.9 } else { 0.1 });

        let metrics = evaluate(&probabilities, &targets, 0.5);
        assert_relative_eq!(metrics.precision, 1.0);
        assert_relative_eq!(metrics.recall, 1.0);
        assert_relative_eq!(metrics.f1, 1.0);
        assert_relative_eq!(metrics.exact_match, 1.0);
    }

    #[test]
    fn test_all_wrong_scores_zero_without_nan() {
        let targets = array![[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]];
        let probabilities = array![[0.1, 0.1, 0.1, 0.1, 0.1, 0.1]];

        let metrics = evaluate(&probabilities, &targets, 0.5);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1, 0.0);
        assert_eq!(metrics.exact_match, 0.0);
        assert!(metrics.per_class_f1.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn test_threshold_is_strict() {
        let targets = array![[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]];
        let probabilities = array![[0.5, 0.0, 0.0, 0.0, 0.0, 0.0]];

        // Exactly 0.5 is a negative prediction, so the positive is missed.
        let metrics = evaluate(&probabilities, &targets, 0.5);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.exact_match, 0.0);
    }

    #[test]
    fn test_mixed_batch_hand_computed() {
        // Class 0: tp=1 fp=1 fn=1 -> p=0.5 r=0.5 f1=0.5
        // Classes 1..5: all true negatives -> 0 contributions
        let targets = array![
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        let probabilities = array![
            [0.9, 0.1, 0.1, 0.1, 0.1, 0.1],
            [0.2, 0.1, 0.1, 0.1, 0.1, 0.1],
            [0.8, 0.1, 0.1, 0.1, 0.1, 0.1],
        ];

        let metrics = evaluate(&probabilities, &targets, 0.5);
        assert_relative_eq!(metrics.per_class_f1[0], 0.5);
        assert_relative_eq!(metrics.f1, 0.5 / 6.0);
        assert_relative_eq!(metrics.exact_match, 1.0 / 3.0);
    }

    #[test]
    fn test_per_class_order_matches_categories() {
        // Only the last class (rate limiting) is ever predicted correctly
        let targets = array![[0.0, 0.0, 0.0, 0.0, 0.0, 1.0]];
        let probabilities = array![[0.0, 0.0, 0.0, 0.0, 0.0, 0.9]];

        let metrics = evaluate(&probabilities, &targets, 0.5);
        assert_relative_eq!(metrics.per_class_f1[5], 1.0);
        assert!(metrics.per_class_f1[..5].iter().all(|&f| f == 0.0));

        let table = metrics.per_class_table();
        assert!(table.contains("RateLim: 1.000"));
    }

    #[test]
    fn test_summary_format() {
        let targets = array![[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]];
        let probabilities = array![[0.9, 0.0, 0.0, 0.0, 0.0, 0.0]];
        let metrics = evaluate(&probabilities, &targets, 0.5);
        assert!(metrics.summary().contains("exact match 1.000"));
    }
}
