use crate::model::classifier::{
    Classifier, ModelError, check_feature_count, check_training_pair, softmax_in_place,
};
use crate::model::progress::{FitProgressObserver, FitProgressStage};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    pub max_iter: usize,
    /// Inverse L2 regularization strength.
    pub c: f64,
    pub step_size: f64,
    /// Stop once the gradient norm falls below this.
    pub tolerance: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            c: 1.0,
            step_size: 0.5,
            tolerance: 1e-6,
        }
    }
}

impl LogisticParams {
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.c > 0.0) {
            return Err(ModelError::InvalidParameter {
                name: "c",
                reason: format!("must be positive, got {}", self.c),
            });
        }
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "step_size",
                reason: format!("must be positive and finite, got {}", self.step_size),
            });
        }
        Ok(())
    }
}

/// Multinomial logistic regression fitted by full-batch gradient descent on
/// the L2-penalized mean log-loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub n_features: usize,
    pub n_classes: usize,
    pub iterations: usize,
    pub intercepts: Array1<f64>,
    /// Shape: `[n_classes, n_features]`.
    pub coefficients: Array2<f64>,
    pub params: LogisticParams,
}

impl LogisticRegression {
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<usize>,
        n_classes: usize,
        params: &LogisticParams,
        progress: &mut dyn FitProgressObserver,
    ) -> Result<Self, ModelError> {
        params.validate()?;
        check_training_pair(x, y, n_classes)?;

        let n = x.nrows() as f64;
        let mut targets = Array2::<f64>::zeros((x.nrows(), n_classes));
        for (i, &label) in y.iter().enumerate() {
            targets[[i, label]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((n_classes, x.ncols()));
        let mut bias = Array1::<f64>::zeros(n_classes);
        let penalty = 1.0 / (params.c * n);
        let mut iterations = 0;

        progress.on_stage_start(FitProgressStage::LogisticRegression, params.max_iter);
        while iterations < params.max_iter {
            let mut proba = x.dot(&weights.t()) + &bias;
            for row in proba.axis_iter_mut(Axis(0)) {
                softmax_in_place(row);
            }
            let residual = proba - &targets;
            let grad_w = residual.t().dot(&x) / n + &weights * penalty;
            let grad_b = residual.sum_axis(Axis(0)) / n;

            let norm = (grad_w.mapv(|g| g * g).sum() + grad_b.mapv(|g| g * g).sum()).sqrt();
            if norm < params.tolerance {
                break;
            }
            weights.scaled_add(-params.step_size, &grad_w);
            bias.scaled_add(-params.step_size, &grad_b);
            iterations += 1;
            if iterations % 50 == 0 {
                progress.on_stage_advance(FitProgressStage::LogisticRegression, iterations);
            }
        }
        progress.on_stage_finish(FitProgressStage::LogisticRegression);
        log::info!("Logistic regression stopped after {iterations} iterations");

        Ok(Self {
            n_features: x.ncols(),
            n_classes,
            iterations,
            intercepts: bias,
            coefficients: weights,
            params: params.clone(),
        })
    }
}

impl LogisticRegression {
    /// Checks that the weight shapes agree with the declared dimensions.
    pub fn validate(&self) -> Result<(), ModelError> {
        let expected = (self.n_classes, self.n_features);
        if self.coefficients.dim() != expected {
            return Err(ModelError::Malformed {
                reason: format!(
                    "coefficients have shape {:?}, expected {:?}",
                    self.coefficients.dim(),
                    expected
                ),
            });
        }
        if self.intercepts.len() != self.n_classes {
            return Err(ModelError::Malformed {
                reason: format!(
                    "{} intercepts for {} classes",
                    self.intercepts.len(),
                    self.n_classes
                ),
            });
        }
        Ok(())
    }
}

impl Classifier for LogisticRegression {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        check_feature_count(self.n_features, x)?;
        let mut scores = x.dot(&self.coefficients.t()) + &self.intercepts;
        for row in scores.axis_iter_mut(Axis(0)) {
            softmax_in_place(row);
        }
        Ok(scores)
    }
}
