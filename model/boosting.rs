//! # Multiclass Gradient Boosting
//!
//! Gradient-boosted regression trees under the multinomial deviance. The raw
//! score of every class starts at the log of its training prior; each round
//! then fits one tree per class to the residuals `y_k - p_k` and adds it with
//! shrinkage. Probabilities are the softmax of the raw scores.
//!
//! Fitting is fully deterministic: there is no row or column subsampling, and
//! the per-class trees of a round are fitted in parallel but collected in class
//! order.

use crate::model::classifier::{
    Classifier, ModelError, check_feature_count, check_training_pair, softmax_in_place,
};
use crate::model::progress::{FitProgressObserver, FitProgressStage};
use crate::model::tree::{BinnedFeatures, RegressionTree, TreeParams, fit_tree};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Hyperparameters of the boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_bins: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 150,
            learning_rate: 0.1,
            max_depth: 6,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_bins: 255,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParameter {
                name: "n_estimators",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "learning_rate",
                reason: format!("must be positive and finite, got {}", self.learning_rate),
            });
        }
        if self.max_bins < 2 {
            return Err(ModelError::InvalidParameter {
                name: "max_bins",
                reason: format!("must be at least 2, got {}", self.max_bins),
            });
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

/// One boosting round: a tree per class, in class order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingRound {
    pub trees: Vec<RegressionTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    pub n_features: usize,
    pub n_classes: usize,
    /// Log class priors; the raw score before any tree is added.
    pub init_scores: Vec<f64>,
    pub params: BoostingParams,
    pub rounds: Vec<BoostingRound>,
}

impl GradientBoostingClassifier {
    /// Fits the ensemble on `x` (one row per sample) and class labels `y`.
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<usize>,
        n_classes: usize,
        params: &BoostingParams,
        progress: &mut dyn FitProgressObserver,
    ) -> Result<Self, ModelError> {
        params.validate()?;
        check_training_pair(x, y, n_classes)?;

        let n = x.nrows();
        log::info!(
            "Fitting gradient boosting: {} samples, {} features, {} classes, {} rounds",
            n,
            x.ncols(),
            n_classes,
            params.n_estimators
        );

        let mut counts = vec![0usize; n_classes];
        for &label in y {
            counts[label] += 1;
        }
        let init_scores: Vec<f64> = counts
            .iter()
            .map(|&c| (c as f64 / n as f64).max(f64::MIN_POSITIVE).ln())
            .collect();

        let binned = BinnedFeatures::build(x, params.max_bins);
        let tree_params = params.tree_params();
        let leaf_scale = (n_classes as f64 - 1.0) / n_classes as f64;

        let mut raw = Array2::from_shape_fn((n, n_classes), |(_, k)| init_scores[k]);
        let mut rounds = Vec::with_capacity(params.n_estimators);

        progress.on_stage_start(FitProgressStage::GradientBoosting, params.n_estimators);
        for round in 0..params.n_estimators {
            let mut proba = raw.clone();
            for row in proba.axis_iter_mut(Axis(0)) {
                softmax_in_place(row);
            }

            let trees: Vec<RegressionTree> = (0..n_classes)
                .into_par_iter()
                .map(|k| {
                    let p = proba.column(k);
                    let gradients: Vec<f64> = (0..n)
                        .map(|i| if y[i] == k { 1.0 - p[i] } else { -p[i] })
                        .collect();
                    let hessians: Vec<f64> = p.iter().map(|&pi| pi * (1.0 - pi)).collect();
                    fit_tree(&binned, &gradients, &hessians, tree_params, leaf_scale)
                })
                .collect();

            for (k, tree) in trees.iter().enumerate() {
                for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                    raw[[i, k]] += params.learning_rate * tree.predict_row(row);
                }
            }

            if log::log_enabled!(log::Level::Debug) && (round + 1) % 10 == 0 {
                log::debug!(
                    "Round {}: training deviance {:.6}",
                    round + 1,
                    mean_deviance(&raw, y)
                );
            }

            rounds.push(BoostingRound { trees });
            progress.on_stage_advance(FitProgressStage::GradientBoosting, round + 1);
        }
        progress.on_stage_finish(FitProgressStage::GradientBoosting);

        Ok(Self {
            n_features: x.ncols(),
            n_classes,
            init_scores,
            params: params.clone(),
            rounds,
        })
    }

    /// Checks that a deserialized ensemble can be evaluated without indexing
    /// out of bounds: one init score and one valid tree per class per round.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.init_scores.len() != self.n_classes {
            return Err(ModelError::Malformed {
                reason: format!(
                    "{} init scores for {} classes",
                    self.init_scores.len(),
                    self.n_classes
                ),
            });
        }
        if !self.params.learning_rate.is_finite() {
            return Err(ModelError::Malformed {
                reason: format!("learning rate is {}", self.params.learning_rate),
            });
        }
        for (r, round) in self.rounds.iter().enumerate() {
            if round.trees.len() != self.n_classes {
                return Err(ModelError::Malformed {
                    reason: format!(
                        "round {r} has {} trees for {} classes",
                        round.trees.len(),
                        self.n_classes
                    ),
                });
            }
            for (k, tree) in round.trees.iter().enumerate() {
                tree.validate(self.n_features).map_err(|e| match e {
                    ModelError::Malformed { reason } => ModelError::Malformed {
                        reason: format!("round {r}, class {k}: {reason}"),
                    },
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    fn raw_row(&self, row: ArrayView1<f64>) -> Array1<f64> {
        let mut scores = Array1::from(self.init_scores.clone());
        for round in &self.rounds {
            for (k, tree) in round.trees.iter().enumerate() {
                scores[k] += self.params.learning_rate * tree.predict_row(row);
            }
        }
        scores
    }

    /// Raw (pre-softmax) class scores.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        check_feature_count(self.n_features, x)?;
        let rows: Vec<Array1<f64>> = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| self.raw_row(row))
            .collect();
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (mut target, scores) in out.axis_iter_mut(Axis(0)).zip(rows) {
            target.assign(&scores);
        }
        Ok(out)
    }
}

impl Classifier for GradientBoostingClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        let mut scores = self.decision_function(x)?;
        for row in scores.axis_iter_mut(Axis(0)) {
            softmax_in_place(row);
        }
        Ok(scores)
    }
}

/// Mean multinomial deviance of raw scores against labels.
fn mean_deviance(raw: &Array2<f64>, y: ArrayView1<usize>) -> f64 {
    let total: f64 = raw
        .axis_iter(Axis(0))
        .zip(y.iter())
        .map(|(row, &label)| {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
            log_sum - row[label]
        })
        .sum();
    total / y.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::progress::NoopFitProgress;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn three_blobs() -> (Array2<f64>, Array1<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..90 {
            let class = i % 3;
            let jitter = (i / 3) as f64 * 0.01;
            rows.extend_from_slice(&[class as f64 * 10.0 + jitter, 1.0 - jitter]);
            labels.push(class);
        }
        (
            Array2::from_shape_vec((90, 2), rows).unwrap(),
            Array1::from(labels),
        )
    }

    fn small_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 20,
            max_depth: 3,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn separates_well_spaced_classes() {
        let (x, y) = three_blobs();
        let model =
            GradientBoostingClassifier::fit(x.view(), y.view(), 3, &small_params(), &mut NoopFitProgress)
                .unwrap();
        assert_eq!(model.rounds.len(), 20);
        assert!(model.rounds.iter().all(|r| r.trees.len() == 3));

        let predicted = model.predict(x.view()).unwrap();
        assert_eq!(predicted, y);

        let proba = model.predict_proba(array![[20.1, 0.5]].view()).unwrap();
        assert_abs_diff_eq!(proba.row(0).sum(), 1.0, epsilon = 1e-9);
        assert!(proba[[0, 2]] > 0.9);
    }

    #[test]
    fn init_scores_are_log_priors() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0, 0, 0, 1];
        let params = BoostingParams {
            n_estimators: 1,
            ..BoostingParams::default()
        };
        let model =
            GradientBoostingClassifier::fit(x.view(), y.view(), 3, &params, &mut NoopFitProgress)
                .unwrap();
        assert_abs_diff_eq!(model.init_scores[0], 0.75f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(model.init_scores[1], 0.25f64.ln(), epsilon = 1e-12);
        assert!(model.init_scores[2] < -700.0);
    }

    #[test]
    fn fitting_is_deterministic() {
        let (x, y) = three_blobs();
        let a = GradientBoostingClassifier::fit(x.view(), y.view(), 3, &small_params(), &mut NoopFitProgress)
            .unwrap();
        let b = GradientBoostingClassifier::fit(x.view(), y.view(), 3, &small_params(), &mut NoopFitProgress)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn validation_catches_structural_damage() {
        let (x, y) = three_blobs();
        let model =
            GradientBoostingClassifier::fit(x.view(), y.view(), 3, &small_params(), &mut NoopFitProgress)
                .unwrap();
        assert_eq!(model.validate(), Ok(()));

        let mut short_round = model.clone();
        short_round.rounds[4].trees.pop();
        assert!(matches!(short_round.validate(), Err(ModelError::Malformed { .. })));

        let mut missing_prior = model.clone();
        missing_prior.init_scores.truncate(2);
        assert!(matches!(missing_prior.validate(), Err(ModelError::Malformed { .. })));

        let mut wide_split = model.clone();
        let node = wide_split.rounds[0].trees[1]
            .nodes
            .iter_mut()
            .find(|n| !n.leaf)
            .unwrap();
        node.feature = 99;
        match wide_split.validate() {
            Err(ModelError::Malformed { reason }) => {
                assert!(reason.starts_with("round 0, class 1:"), "{reason}")
            }
            other => panic!("expected a malformed model, got {other:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_width_and_bad_params() {
        let (x, y) = three_blobs();
        let model =
            GradientBoostingClassifier::fit(x.view(), y.view(), 3, &small_params(), &mut NoopFitProgress)
                .unwrap();
        assert_eq!(
            model.predict_proba(array![[1.0, 2.0, 3.0]].view()),
            Err(ModelError::FeatureCountMismatch {
                expected: 2,
                found: 3
            })
        );

        let bad = BoostingParams {
            learning_rate: 0.0,
            ..BoostingParams::default()
        };
        assert!(matches!(
            GradientBoostingClassifier::fit(x.view(), y.view(), 3, &bad, &mut NoopFitProgress),
            Err(ModelError::InvalidParameter { name: "learning_rate", .. })
        ));
    }
}
