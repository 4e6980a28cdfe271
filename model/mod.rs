pub mod artifacts;
pub mod boosting;
pub mod classifier;
pub mod logistic;
pub mod progress;
pub mod scaler;
pub mod tree;
