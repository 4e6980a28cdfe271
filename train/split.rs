use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::schema::FeatureMatrix;

/// Row indices of a train/test partition. Both lists are ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified partition: within each class the rows are shuffled and the
/// first `round(test_fraction * n_class)` go to the test side. Classes are
/// visited in index order so the RNG stream is consumed reproducibly.
pub fn stratified_split<R: Rng + ?Sized>(
    labels: ArrayView1<usize>,
    n_classes: usize,
    test_fraction: f64,
    rng: &mut R,
) -> SplitIndices {
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for class in 0..n_classes {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(rng);
        let n_test = ((test_fraction * members.len() as f64).round() as usize).min(members.len());
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    SplitIndices { train, test }
}

/// Gathers the rows named by `indices` from a feature matrix and its labels.
pub fn take_rows(
    x: ArrayView2<f64>,
    y: ArrayView1<usize>,
    indices: &[usize],
) -> (FeatureMatrix, Array1<usize>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}
