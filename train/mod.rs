pub mod config;
pub mod pipeline;
pub mod report;
pub mod split;
pub mod synth;
pub mod table;

pub use config::{ConfigError, TrainingConfig};
pub use pipeline::{
    TrainingError, TrainingSummary, fit_artifacts, run_training, run_training_from_table,
};
pub use report::ClassificationReport;
