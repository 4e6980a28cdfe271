//! # Training Pipeline
//!
//! One offline run: synthesize a seeded table, persist it, split it by tier,
//! fit the scaler and both classifiers, evaluate them on the held-out rows and
//! write the artifact set that [`InferenceContext`] loads. A run can also start
//! from a table written earlier, skipping synthesis.
//!
//! A single `StdRng` seeded from the config drives both the synthesis and the
//! split; the fitting itself draws no randomness. The whole run is therefore a
//! pure function of the config (and of the input table, when one is given).
//!
//! [`InferenceContext`]: crate::scoring::InferenceContext

use crate::model::artifacts::{ArtifactError, ArtifactPaths, FittedArtifacts};
use crate::model::boosting::GradientBoostingClassifier;
use crate::model::classifier::{Classifier, ModelError};
use crate::model::logistic::LogisticRegression;
use crate::model::progress::FitProgressObserver;
use crate::model::scaler::StandardScaler;
use crate::panel::RiskTier;
use crate::schema::{CANONICAL_FEATURES, FeatureSchema};
use crate::train::config::{ConfigError, TrainingConfig};
use crate::train::report::ClassificationReport;
use crate::train::split::{stratified_split, take_rows};
use crate::train::synth::{SynthesisError, synthesize};
use crate::train::table::{TableError, TrainingTable};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MODEL_INFO_FILE: &str = "model_info.txt";

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Training table error: {0}")]
    Table(#[from] TableError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("Model fitting failed: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to format {MODEL_INFO_FILE}: {0}")]
    Format(#[from] fmt::Error),
}

/// What a training run produced, for printing and for tests.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub samples: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Rows per tier across the full table.
    pub tier_counts: [usize; 3],
    pub gradient_boosting: ClassificationReport,
    pub logistic_regression: ClassificationReport,
    pub table_path: PathBuf,
    pub artifacts: ArtifactPaths,
    pub model_info_path: PathBuf,
}

/// Fits scaler, gradient boosting and logistic regression on raw
/// (unstandardized) training rows laid out by the canonical schema.
pub fn fit_artifacts(
    x: ArrayView2<f64>,
    y: ArrayView1<usize>,
    config: &TrainingConfig,
    progress: &mut dyn FitProgressObserver,
) -> Result<FittedArtifacts, ModelError> {
    let n_classes = RiskTier::ALL.len();
    let scaler = StandardScaler::fit(x)?;
    let scaled = scaler.transform(x)?;

    let gradient_boosting =
        GradientBoostingClassifier::fit(scaled.view(), y, n_classes, &config.boosting, progress)?;
    let logistic_regression =
        LogisticRegression::fit(scaled.view(), y, n_classes, &config.logistic, progress)?;

    Ok(FittedArtifacts {
        scaler,
        gradient_boosting,
        logistic_regression,
        schema: FeatureSchema::canonical(),
    })
}

/// Runs the full pipeline, writing the table, the four artifacts and
/// `model_info.txt` into `out_dir`.
pub fn run_training(
    config: &TrainingConfig,
    out_dir: &Path,
    progress: &mut dyn FitProgressObserver,
) -> Result<TrainingSummary, TrainingError> {
    config.validate()?;
    fs::create_dir_all(out_dir)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    log::info!(
        "Generating {} synthetic samples (seed {})",
        config.samples,
        config.seed
    );
    let set = synthesize(config.samples, &mut rng)?;
    let table = TrainingTable::from(&set);
    let table_path = out_dir.join(format!("synthetic_data_{}.csv", config.samples));
    table.write_csv(&table_path)?;

    fit_table(config, &table, table_path, out_dir, &mut rng, progress)
}

/// Fits from a table previously written by `labrisk synthesize` or a training
/// run. `config.samples` is ignored; the table decides the row count.
pub fn run_training_from_table(
    config: &TrainingConfig,
    table_path: &Path,
    out_dir: &Path,
    progress: &mut dyn FitProgressObserver,
) -> Result<TrainingSummary, TrainingError> {
    config.validate()?;
    let table = TrainingTable::read_csv(table_path, &FeatureSchema::canonical())?;
    log::info!(
        "Loaded {} training rows from {}",
        table.n_rows(),
        table_path.display()
    );
    fs::create_dir_all(out_dir)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    fit_table(config, &table, table_path.to_path_buf(), out_dir, &mut rng, progress)
}

/// Split, fit, evaluate and save, shared by both entry points.
fn fit_table(
    config: &TrainingConfig,
    table: &TrainingTable,
    table_path: PathBuf,
    out_dir: &Path,
    rng: &mut StdRng,
    progress: &mut dyn FitProgressObserver,
) -> Result<TrainingSummary, TrainingError> {
    let split = stratified_split(
        table.labels.view(),
        RiskTier::ALL.len(),
        config.test_fraction,
        rng,
    );
    let (train_x, train_y) = take_rows(table.features.view(), table.labels.view(), &split.train);
    let (test_x, test_y) = take_rows(table.features.view(), table.labels.view(), &split.test);
    log::info!(
        "Training samples: {}, Test samples: {}",
        split.train.len(),
        split.test.len()
    );
    if split.test.is_empty() {
        log::warn!("Test split is empty; held-out metrics will read as zero");
    }

    let artifacts = fit_artifacts(train_x.view(), train_y.view(), config, progress)?;

    let scaled_test = artifacts.scaler.transform(test_x.view())?;
    let gb_report = evaluate(&artifacts.gradient_boosting, scaled_test.view(), test_y.view())?;
    log::info!("Gradient boosting accuracy: {:.3}", gb_report.accuracy);
    let lr_report = evaluate(&artifacts.logistic_regression, scaled_test.view(), test_y.view())?;
    log::info!("Logistic regression accuracy: {:.3}", lr_report.accuracy);

    let paths = artifacts.save(out_dir)?;
    let model_info_path = out_dir.join(MODEL_INFO_FILE);
    let mut info = String::new();
    write_model_info(&mut info, config, table.n_rows(), &gb_report, &lr_report)?;
    fs::write(&model_info_path, info)?;
    log::info!("Saved model artifacts to {}", out_dir.display());

    Ok(TrainingSummary {
        samples: table.n_rows(),
        train_rows: split.train.len(),
        test_rows: split.test.len(),
        tier_counts: tier_counts(table.labels.view()),
        gradient_boosting: gb_report,
        logistic_regression: lr_report,
        table_path,
        artifacts: paths,
        model_info_path,
    })
}

fn tier_counts(labels: ArrayView1<usize>) -> [usize; 3] {
    let mut counts = [0; 3];
    for &label in labels {
        counts[label] += 1;
    }
    counts
}

fn evaluate(
    model: &dyn Classifier,
    x: ArrayView2<f64>,
    y: ArrayView1<usize>,
) -> Result<ClassificationReport, ModelError> {
    let predicted: Array1<usize> = model.predict(x)?;
    Ok(ClassificationReport::evaluate(y, predicted.view()))
}

fn write_model_info(
    out: &mut impl fmt::Write,
    config: &TrainingConfig,
    samples: usize,
    gb: &ClassificationReport,
    lr: &ClassificationReport,
) -> fmt::Result {
    writeln!(out, "Unified lab-panel risk model")?;
    writeln!(out, "============================\n")?;
    writeln!(out, "Single model for all lab types:")?;
    writeln!(
        out,
        "  - Training samples: {samples} (CBC + Urinalysis + Lipid), seed {}",
        config.seed
    )?;
    writeln!(out, "  - Gradient Boosting Accuracy: {:.3}", gb.accuracy)?;
    writeln!(out, "  - Logistic Regression Accuracy: {:.3}\n", lr.accuracy)?;
    writeln!(out, "Features ({}):", CANONICAL_FEATURES.len())?;
    writeln!(
        out,
        "  - lab_type: lab type identifier (0=CBC, 1=Urinalysis, 2=Lipid)"
    )?;
    writeln!(out, "  - CBC: WBC, RBC, Hemoglobin, Platelets")?;
    writeln!(out, "  - Lipid: Cholesterol, HDL, LDL, Triglycerides, VLDL")?;
    writeln!(out, "  - Glucose/A1C: Glucose, A1C")?;
    writeln!(
        out,
        "  - Urinalysis: pH, Specific Gravity, Protein, Ketones, Blood, Nitrites, Leukocyte Esterase\n"
    )?;
    writeln!(out, "Target classes ({}):", RiskTier::ALL.len())?;
    for tier in RiskTier::ALL {
        writeln!(out, "  - {}: {} Risk", tier.index(), tier.title())?;
    }
    Ok(())
}
