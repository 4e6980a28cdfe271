#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use rayon::prelude::*;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use labrisk::model::progress::{ConsoleFitProgress, FitProgressObserver, NoopFitProgress};
use labrisk::schema::CANONICAL_FEATURES;
use labrisk::scoring::HealthReport;
use labrisk::train::synth::synthesize;
use labrisk::train::table::TrainingTable;
use labrisk::train::{TrainingConfig, run_training, run_training_from_table};
use labrisk::{InferenceContext, LabRequest, PredictionResponse};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

const DEFAULT_MODEL_DIR: &str = "models";

#[derive(Args)]
pub struct TrainArgs {
    /// Directory that receives the table, the model artifacts and model_info.txt
    #[arg(long, default_value = DEFAULT_MODEL_DIR)]
    pub out_dir: PathBuf,

    /// Fit from an existing training table instead of synthesizing one
    #[arg(long, value_name = "PATH")]
    pub table: Option<PathBuf>,

    /// TOML file with training settings; flags below override it
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Total number of rows to synthesize (split evenly across panels)
    #[arg(long, value_name = "N")]
    pub samples: Option<usize>,

    /// Seed for synthesis and the train/test split
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fraction of each tier held out for evaluation
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Number of boosting rounds
    #[arg(long, value_name = "N")]
    pub estimators: Option<usize>,

    /// Shrinkage applied to each boosting round
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Maximum depth of each boosted tree
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Do not draw a progress bar
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct SynthesizeArgs {
    /// Total number of rows to synthesize
    #[arg(long, default_value = "10000")]
    pub samples: usize,

    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Output CSV path (defaults to synthetic_data_<samples>.csv)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// JSON request file; reads stdin when omitted or "-"
    pub input: Option<PathBuf>,

    /// Directory holding the trained model artifacts
    #[arg(long, default_value = DEFAULT_MODEL_DIR)]
    pub models: PathBuf,
}

#[derive(Args)]
pub struct BatchArgs {
    /// File with one JSON request per line
    pub input: PathBuf,

    /// Directory holding the trained model artifacts
    #[arg(long, default_value = DEFAULT_MODEL_DIR)]
    pub models: PathBuf,

    /// Write responses here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "labrisk",
    about = "Health-risk classification for lab panels",
    long_about = "Synthesizes lab-panel training data, trains the unified risk classifier \
                 and scores CBC, urinalysis and lipid requests."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize data, fit the models and save the artifacts
    #[command(about = "Train the unified risk model (outputs: scaler.toml, gradient_boosting.toml, ...)")]
    Train(TrainArgs),

    /// Write a synthetic training table without fitting anything
    #[command(about = "Write a synthetic training table (outputs: synthetic_data_<n>.csv)")]
    Synthesize(SynthesizeArgs),

    /// Score one JSON request
    #[command(about = "Score a single lab request")]
    Predict(PredictArgs),

    /// Score a JSON-lines file of requests
    #[command(about = "Score one request per line")]
    PredictBatch(BatchArgs),

    /// Report whether the model artifacts load
    #[command(about = "Check that the model artifacts are present and consistent")]
    Health {
        #[arg(long, default_value = DEFAULT_MODEL_DIR)]
        models: PathBuf,
    },

    /// Print the feature schema with its default values
    #[command(about = "Print the feature schema")]
    Schema,

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Train(args)) => train(args),
        Some(Commands::Synthesize(args)) => run_synthesize(args),
        Some(Commands::Predict(args)) => predict(args),
        Some(Commands::PredictBatch(args)) => predict_batch(args),
        Some(Commands::Health { models }) => health(&models),
        Some(Commands::Schema) => {
            print_schema();
            Ok(())
        }
        Some(Commands::Version) => {
            println!("labrisk {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn training_config(args: &TrainArgs) -> Result<TrainingConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading training config from: {}", path.display());
            TrainingConfig::from_toml_file(path)?
        }
        None => TrainingConfig::default(),
    };
    if let Some(samples) = args.samples {
        config.samples = samples;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(fraction) = args.test_fraction {
        config.test_fraction = fraction;
    }
    if let Some(estimators) = args.estimators {
        config.boosting.n_estimators = estimators;
    }
    if let Some(rate) = args.learning_rate {
        config.boosting.learning_rate = rate;
    }
    if let Some(depth) = args.max_depth {
        config.boosting.max_depth = depth;
    }
    config.validate()?;
    Ok(config)
}

pub fn train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = training_config(&args)?;
    let mut console = ConsoleFitProgress::new();
    let mut noop = NoopFitProgress;
    let progress: &mut dyn FitProgressObserver = if args.quiet { &mut noop } else { &mut console };

    let summary = match &args.table {
        Some(table) => {
            println!(
                "Training unified model on {} (seed {})...",
                table.display(),
                config.seed
            );
            run_training_from_table(&config, table, &args.out_dir, progress)?
        }
        None => {
            println!(
                "Training unified model on {} samples (seed {})...",
                config.samples, config.seed
            );
            run_training(&config, &args.out_dir, progress)?
        }
    };

    println!("Training table: {}", summary.table_path.display());
    println!(
        "Training samples: {}, Test samples: {}",
        summary.train_rows, summary.test_rows
    );
    println!(
        "Tier counts: low {}, moderate {}, high {}",
        summary.tier_counts[0], summary.tier_counts[1], summary.tier_counts[2]
    );
    println!(
        "Gradient Boosting accuracy: {:.3}",
        summary.gradient_boosting.accuracy
    );
    println!(
        "Logistic Regression accuracy: {:.3}",
        summary.logistic_regression.accuracy
    );
    println!("\nGradient Boosting classification report:");
    println!("{}", summary.gradient_boosting);
    println!("\nArtifacts:");
    for path in summary.artifacts.all() {
        println!("  {}", path.display());
    }
    println!("  {}", summary.model_info_path.display());
    Ok(())
}

fn run_synthesize(args: SynthesizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("synthetic_data_{}.csv", args.samples)));
    let mut rng = StdRng::seed_from_u64(args.seed);
    let set = synthesize(args.samples, &mut rng)?;
    TrainingTable::from(&set).write_csv(&output)?;
    println!("Saved {} rows to: {}", set.len(), output.display());
    Ok(())
}

fn read_request_body(input: Option<&Path>) -> io::Result<String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path),
        _ => io::read_to_string(io::stdin()),
    }
}

pub fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let context = InferenceContext::load(&args.models)?;
    let body = read_request_body(args.input.as_deref())?;
    let request = LabRequest::from_json_str(&body)?;

    let result = context.predict(&request).map_err(|e| {
        log::error!(
            "Scoring failed for {} request with fields {:?}: {e}",
            request.panel(),
            request.keys()
        );
        "Prediction failed"
    })?;
    let response = PredictionResponse::from(result);
    println!("{}", serde_json::to_string_pretty(&response)?);
    log::info!(
        "Prediction: {} (score {}, confidence {}%)",
        response.risk_level,
        response.risk_score,
        response.confidence
    );
    Ok(())
}

fn score_line(context: &InferenceContext, number: usize, line: &str) -> serde_json::Value {
    let request = match LabRequest::from_json_str(line) {
        Ok(request) => request,
        Err(e) => return json!({ "line": number, "error": e.to_string() }),
    };
    match context.predict(&request) {
        Ok(result) => json!(PredictionResponse::from(result)),
        Err(e) => {
            log::error!(
                "Scoring failed on line {number} for {} request with fields {:?}: {e}",
                request.panel(),
                request.keys()
            );
            json!({ "line": number, "error": "Prediction failed" })
        }
    }
}

pub fn predict_batch(args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let context = InferenceContext::load(&args.models)?;
    let reader = BufReader::new(fs::File::open(&args.input)?);
    let lines: Vec<(usize, String)> = reader
        .lines()
        .enumerate()
        .map(|(i, line)| line.map(|l| (i + 1, l)))
        .collect::<Result<_, _>>()?;

    let responses: Vec<serde_json::Value> = lines
        .par_iter()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| score_line(&context, *number, line))
        .collect();

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    for response in &responses {
        writeln!(writer, "{response}")?;
    }
    writer.flush()?;
    log::info!("Scored {} requests from {}", responses.len(), args.input.display());
    Ok(())
}

fn health(models: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let report = HealthReport::check(models);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_healthy() {
        process::exit(1);
    }
    Ok(())
}

fn print_schema() {
    println!("{:>4}  {:<20} {:>10}", "#", "feature", "default");
    for (i, feature) in CANONICAL_FEATURES.iter().enumerate() {
        println!(
            "{:>4}  {:<20} {:>10}",
            i,
            feature.name(),
            feature.default_value()
        );
    }
}
