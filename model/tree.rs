//! # Histogram Regression Trees
//!
//! The weak learner behind [`GradientBoostingClassifier`]. Features are
//! quantized once per fit into at most `max_bins` ordered bins; split search then
//! runs over per-node bin histograms instead of re-sorting samples at every
//! node. Each candidate split is stored as a raw-value threshold, so prediction
//! never needs the bin mapping:
//!
//! `bin(x) <= b` holds exactly when `x <= thresholds[b]`.
//!
//! Leaves carry a single Newton step `scale * sum(g) / sum(h)`, where `g` are
//! the per-sample residuals and `h` the matching second-order weights.
//!
//! [`GradientBoostingClassifier`]: crate::model::boosting::GradientBoostingClassifier

use crate::model::classifier::ModelError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Denominators below this are treated as zero when computing leaf values.
const MIN_HESSIAN: f64 = 1e-150;

/// Splits must reduce the squared error by more than this to be taken.
const MIN_GAIN: f64 = 1e-12;

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

/// A node of a flattened regression tree. Children are indices into
/// [`RegressionTree::nodes`]; leaves ignore `feature`, `threshold`, `left` and
/// `right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub leaf: bool,
    pub feature: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    pub value: f64,
}

impl TreeNode {
    fn leaf(value: f64) -> Self {
        Self {
            leaf: true,
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Walks the tree for one sample. Samples go left when `x <= threshold`.
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            if node.leaf {
                return node.value;
            }
            index = if row[node.feature] <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }

    /// Checks the invariants [`RegressionTree::predict_row`] relies on: every
    /// split reads a column below `n_features` and every child index points
    /// strictly forward into `nodes`. Fitted trees are laid out in pre-order,
    /// so forward children also rule out cycles.
    pub fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        let malformed = |reason: String| -> Result<(), ModelError> {
            Err(ModelError::Malformed { reason })
        };
        if self.nodes.is_empty() {
            return malformed("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.leaf {
                if !node.value.is_finite() {
                    return malformed(format!("leaf {index} holds {}", node.value));
                }
                continue;
            }
            if node.feature >= n_features {
                return malformed(format!(
                    "node {index} splits on column {} of {n_features}",
                    node.feature
                ));
            }
            if node.threshold.is_nan() {
                return malformed(format!("node {index} has a NaN threshold"));
            }
            for child in [node.left, node.right] {
                if child <= index || child >= self.nodes.len() {
                    return malformed(format!(
                        "node {index} points to child {child} outside {}..{}",
                        index + 1,
                        self.nodes.len()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A feature matrix quantized into ordered bins, built once per fit.
#[derive(Debug, Clone)]
pub struct BinnedFeatures {
    /// Bin index per sample and feature. Shape: `[n_samples, n_features]`.
    bins: Array2<u16>,
    /// Ascending cut points per feature; feature `f` has `thresholds[f].len() + 1` bins.
    thresholds: Vec<Vec<f64>>,
}

impl BinnedFeatures {
    pub fn build(x: ArrayView2<f64>, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, u16::MAX as usize);
        let thresholds: Vec<Vec<f64>> = x
            .columns()
            .into_iter()
            .map(|column| cut_points(column, max_bins))
            .collect();
        let bins = Array2::from_shape_fn(x.dim(), |(i, f)| {
            let cuts = &thresholds[f];
            cuts.partition_point(|&t| t < x[[i, f]]) as u16
        });
        Self { bins, thresholds }
    }

    pub fn n_samples(&self) -> usize {
        self.bins.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.bins.ncols()
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }
}

/// Cut points for one column: midpoints between distinct values when there are
/// few of them, otherwise evenly spaced quantiles.
fn cut_points(column: ArrayView1<f64>, max_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = sorted.clone();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    }

    let n = sorted.len();
    let mut cuts: Vec<f64> = (1..max_bins).map(|q| sorted[q * n / max_bins]).collect();
    cuts.dedup();
    // The largest value would leave the last bin empty.
    if cuts.last() == distinct.last() {
        cuts.pop();
    }
    cuts
}

struct Split {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    binned: &'a BinnedFeatures,
    gradients: &'a [f64],
    hessians: &'a [f64],
    params: TreeParams,
    leaf_scale: f64,
    nodes: Vec<TreeNode>,
}

impl TreeBuilder<'_> {
    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let (g, h) = indices.iter().fold((0.0, 0.0), |(g, h), &i| {
            (g + self.gradients[i], h + self.hessians[i])
        });
        if h.abs() < MIN_HESSIAN {
            0.0
        } else {
            self.leaf_scale * g / h
        }
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode::leaf(0.0));

        let split = if depth < self.params.max_depth
            && indices.len() >= self.params.min_samples_split
        {
            self.best_split(&indices)
        } else {
            None
        };

        match split {
            None => {
                self.nodes[id].value = self.leaf_value(&indices);
            }
            Some(split) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| self.binned.bins[[i, split.feature]] as usize <= split.bin);
                let threshold = self.binned.thresholds[split.feature][split.bin];
                let left_id = self.grow(left, depth + 1);
                let right_id = self.grow(right, depth + 1);
                self.nodes[id] = TreeNode {
                    leaf: false,
                    feature: split.feature,
                    threshold,
                    left: left_id,
                    right: right_id,
                    value: 0.0,
                };
            }
        }
        id
    }

    /// Best variance-reduction split over all features and bin boundaries.
    fn best_split(&self, indices: &[usize]) -> Option<Split> {
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.gradients[i]).sum();
        let parent_score = total * total / n as f64;
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<Split> = None;
        for feature in 0..self.binned.n_features() {
            let n_bins = self.binned.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let mut sums = vec![0.0; n_bins];
            let mut counts = vec![0usize; n_bins];
            for &i in indices {
                let b = self.binned.bins[[i, feature]] as usize;
                sums[b] += self.gradients[i];
                counts[b] += 1;
            }

            let mut left_sum = 0.0;
            let mut left_count = 0;
            for bin in 0..n_bins - 1 {
                left_sum += sums[bin];
                left_count += counts[bin];
                let right_count = n - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_count as f64
                    + right_sum * right_sum / right_count as f64
                    - parent_score;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(Split { feature, bin, gain });
                }
            }
        }
        best
    }
}

/// Fits one regression tree to `gradients` with Newton leaf values.
///
/// `leaf_scale` multiplies every leaf; multinomial boosting passes `(K - 1) / K`.
pub fn fit_tree(
    binned: &BinnedFeatures,
    gradients: &[f64],
    hessians: &[f64],
    params: TreeParams,
    leaf_scale: f64,
) -> RegressionTree {
    let mut builder = TreeBuilder {
        binned,
        gradients,
        hessians,
        params,
        leaf_scale,
        nodes: Vec::new(),
    };
    builder.grow((0..binned.n_samples()).collect(), 0);
    RegressionTree {
        nodes: builder.nodes,
    }
}
