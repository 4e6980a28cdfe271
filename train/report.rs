use crate::panel::RiskTier;
use ndarray::{Array2, ArrayView1};
use serde::Serialize;
use std::fmt;

/// Precision, recall, F1 and support of one tier on a held-out set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierMetrics {
    pub tier: RiskTier,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Held-out evaluation of one classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub per_tier: Vec<TierMetrics>,
    /// `confusion[[actual, predicted]]`
    #[serde(skip)]
    pub confusion: Array2<usize>,
}

impl ClassificationReport {
    /// Scores `predicted` against `actual`. Undefined ratios (no predictions or
    /// no support for a tier) are reported as 0.
    pub fn evaluate(actual: ArrayView1<usize>, predicted: ArrayView1<usize>) -> Self {
        let k = RiskTier::ALL.len();
        let mut confusion = Array2::<usize>::zeros((k, k));
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            confusion[[a, p]] += 1;
        }

        let total = actual.len();
        let correct: usize = (0..k).map(|i| confusion[[i, i]]).sum();
        let accuracy = ratio(correct, total);

        let per_tier = RiskTier::ALL
            .iter()
            .map(|&tier| {
                let i = tier.index();
                let tp = confusion[[i, i]];
                let support = confusion.row(i).sum();
                let predicted_as = confusion.column(i).sum();
                let precision = ratio(tp, predicted_as);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                TierMetrics {
                    tier,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        Self {
            accuracy,
            per_tier,
            confusion,
        }
    }

    pub fn support(&self) -> usize {
        self.per_tier.iter().map(|m| m.support).sum()
    }

    pub fn macro_f1(&self) -> f64 {
        self.per_tier.iter().map(|m| m.f1).sum::<f64>() / self.per_tier.len() as f64
    }

    pub fn weighted_f1(&self) -> f64 {
        let total = self.support();
        if total == 0 {
            return 0.0;
        }
        self.per_tier
            .iter()
            .map(|m| m.f1 * m.support as f64)
            .sum::<f64>()
            / total as f64
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for m in &self.per_tier {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                m.tier.title(),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.support()
        )?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
            "macro avg",
            "",
            "",
            self.macro_f1(),
            self.support()
        )?;
        write!(
            f,
            "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
            "weighted avg",
            "",
            "",
            self.weighted_f1(),
            self.support()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn metrics_match_hand_computation() {
        let actual = array![0, 0, 0, 1, 1, 2];
        let predicted = array![0, 0, 1, 1, 2, 2];
        let report = ClassificationReport::evaluate(actual.view(), predicted.view());

        assert_abs_diff_eq!(report.accuracy, 4.0 / 6.0, epsilon = 1e-12);
        let low = report.per_tier[0];
        assert_abs_diff_eq!(low.precision, 1.0);
        assert_abs_diff_eq!(low.recall, 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(low.f1, 0.8, epsilon = 1e-12);
        assert_eq!(low.support, 3);
        let moderate = report.per_tier[1];
        assert_abs_diff_eq!(moderate.precision, 0.5);
        assert_abs_diff_eq!(moderate.recall, 0.5);
        assert_eq!(report.confusion[[1, 2]], 1);
        assert_eq!(report.support(), 6);
    }

    #[test]
    fn tiers_without_support_score_zero() {
        let actual = array![0, 0];
        let predicted = array![0, 0];
        let report = ClassificationReport::evaluate(actual.view(), predicted.view());
        assert_eq!(report.per_tier[2].support, 0);
        assert_eq!(report.per_tier[2].f1, 0.0);
        assert_eq!(report.accuracy, 1.0);

        let text = report.to_string();
        assert!(text.contains("Low"));
        assert!(text.contains("accuracy"));
    }
}
