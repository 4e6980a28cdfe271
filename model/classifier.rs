use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use thiserror::Error;

/// Errors raised while fitting or applying a learning primitive.
#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Cannot fit a model on an empty training set.")]
    EmptyTrainingSet,
    #[error("Feature matrix has {rows} rows but {labels} labels were supplied.")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("Label {label} is out of range for a {n_classes}-class model.")]
    LabelOutOfRange { label: usize, n_classes: usize },
    #[error("Input has {found} feature columns, but the model was fitted on {expected}.")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("Invalid hyperparameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Malformed model: {reason}")]
    Malformed { reason: String },
}

/// A fitted probabilistic classifier over a dense feature matrix.
pub trait Classifier: Send + Sync {
    fn n_features(&self) -> usize;

    fn n_classes(&self) -> usize;

    /// Class probabilities, one row per sample. Rows sum to one.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ModelError>;

    /// The most probable class for each sample.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<usize>, ModelError> {
        let proba = self.predict_proba(x)?;
        Ok(proba.axis_iter(Axis(0)).map(argmax).collect())
    }
}

/// Index of the largest entry; the first one wins on ties.
pub fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &value) in row.iter().enumerate() {
        if value > row[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable in-place softmax.
pub fn softmax_in_place(mut row: ArrayViewMut1<f64>) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    row.mapv_inplace(|v| (v - max).exp());
    let total = row.sum();
    row.mapv_inplace(|v| v / total);
}

pub(crate) fn check_feature_count(expected: usize, x: ArrayView2<f64>) -> Result<(), ModelError> {
    if x.ncols() != expected {
        return Err(ModelError::FeatureCountMismatch {
            expected,
            found: x.ncols(),
        });
    }
    Ok(())
}

/// Shared validation of a `(X, y)` training pair.
pub(crate) fn check_training_pair(
    x: ArrayView2<f64>,
    y: ArrayView1<usize>,
    n_classes: usize,
) -> Result<(), ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    if x.nrows() != y.len() {
        return Err(ModelError::LabelCountMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    if let Some(&label) = y.iter().find(|&&label| label >= n_classes) {
        return Err(ModelError::LabelOutOfRange { label, n_classes });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(array![0.2, 0.5, 0.3].view()), 1);
        assert_eq!(argmax(array![0.4, 0.4, 0.2].view()), 0);
        assert_eq!(argmax(array![0.1, 0.1, 0.8].view()), 2);
    }

    #[test]
    fn softmax_is_shift_invariant_and_normalized() {
        let mut a = array![1.0, 2.0, 3.0];
        let mut b = array![1001.0, 1002.0, 1003.0];
        softmax_in_place(a.view_mut());
        softmax_in_place(b.view_mut());
        assert_abs_diff_eq!(a.sum(), 1.0, epsilon = 1e-12);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn training_pair_validation() {
        let x = Array2::<f64>::zeros((3, 2));
        assert_eq!(
            check_training_pair(x.view(), array![0, 1].view(), 3),
            Err(ModelError::LabelCountMismatch { rows: 3, labels: 2 })
        );
        assert_eq!(
            check_training_pair(x.view(), array![0, 1, 3].view(), 3),
            Err(ModelError::LabelOutOfRange {
                label: 3,
                n_classes: 3
            })
        );
        assert!(check_training_pair(x.view(), array![0, 1, 2].view(), 3).is_ok());
    }
}
