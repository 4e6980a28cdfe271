use crate::model::classifier::{ModelError, check_feature_count};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column affine standardization: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population standard deviation per column; constant columns use 1.0.
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<f64>) -> Result<Self, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let n = x.nrows() as f64;
        let mean = x.sum_axis(Axis(0)) / n;
        let centered = &x - &mean.view().insert_axis(Axis(0));
        let variance = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n;
        let scale = variance.mapv(|v| {
            let sd = v.sqrt();
            if sd > f64::EPSILON { sd } else { 1.0 }
        });
        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Mean and scale must line up, and every scale must be a usable divisor.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.scale.len() != self.mean.len() {
            return Err(ModelError::Malformed {
                reason: format!(
                    "{} means but {} scales",
                    self.mean.len(),
                    self.scale.len()
                ),
            });
        }
        if let Some(j) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(ModelError::Malformed {
                reason: format!("column {j} has mean {}", self.mean[j]),
            });
        }
        if let Some(j) = self.scale.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(ModelError::Malformed {
                reason: format!("column {j} has scale {}", self.scale[j]),
            });
        }
        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        check_feature_count(self.n_features(), x)?;
        Ok((&x - &self.mean.view().insert_axis(Axis(0))) / &self.scale.view().insert_axis(Axis(0)))
    }

    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>, ModelError> {
        if row.len() != self.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.n_features(),
                found: row.len(),
            });
        }
        Ok((&row - &self.mean) / &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn standardizes_columns_with_population_deviation() {
        let x = array![[1.0, 10.0, 5.0], [3.0, 10.0, 5.0], [5.0, 10.0, 5.0]];
        let scaler = StandardScaler::fit(x.view()).unwrap();
        assert_eq!(scaler.mean, array![3.0, 10.0, 5.0]);
        assert_abs_diff_eq!(scaler.scale[0], (8.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(scaler.scale[1], 1.0);

        let z = scaler.transform(x.view()).unwrap();
        assert_abs_diff_eq!(z.column(0).sum(), 0.0, epsilon = 1e-12);
        assert_eq!(z.column(1), array![0.0, 0.0, 0.0]);

        let row = scaler.transform_row(array![5.0, 12.0, 5.0].view()).unwrap();
        assert_abs_diff_eq!(row[0], z[[2, 0]], epsilon = 1e-12);
        assert_eq!(row[1], 2.0);
    }

    #[test]
    fn validation_rejects_unusable_parameters() {
        let scaler = StandardScaler::fit(array![[1.0, 2.0], [2.0, 3.0]].view()).unwrap();
        assert_eq!(scaler.validate(), Ok(()));

        let mut ragged = scaler.clone();
        ragged.scale = array![1.0];
        assert!(matches!(ragged.validate(), Err(ModelError::Malformed { .. })));

        let mut zero = scaler.clone();
        zero.scale[1] = 0.0;
        assert_eq!(
            zero.validate(),
            Err(ModelError::Malformed {
                reason: "column 1 has scale 0".to_string()
            })
        );
    }

    #[test]
    fn rejects_wrong_width() {
        let scaler = StandardScaler::fit(array![[1.0, 2.0], [2.0, 3.0]].view()).unwrap();
        assert_eq!(
            scaler.transform_row(array![1.0].view()),
            Err(ModelError::FeatureCountMismatch {
                expected: 2,
                found: 1
            })
        );
        assert!(StandardScaler::fit(Array2::<f64>::zeros((0, 2)).view()).is_err());
    }
}
