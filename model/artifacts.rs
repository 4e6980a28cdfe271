//! # Fitted Artifact Store
//!
//! A training run produces four artifacts, each persisted as a human-readable
//! TOML file inside one model directory:
//!
//! | file                       | contents                                   |
//! |----------------------------|--------------------------------------------|
//! | `scaler.toml`              | per-feature mean and scale                 |
//! | `gradient_boosting.toml`   | the primary classifier                     |
//! | `logistic_regression.toml` | the secondary classifier (reported only)   |
//! | `features.toml`            | the ordered feature-name snapshot          |
//!
//! All four must be present and mutually consistent before any request can be
//! scored.

use crate::model::boosting::GradientBoostingClassifier;
use crate::model::classifier::{Classifier, ModelError};
use crate::model::logistic::LogisticRegression;
use crate::model::scaler::StandardScaler;
use crate::panel::RiskTier;
use crate::schema::{FeatureSchema, SchemaError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCALER_FILE: &str = "scaler.toml";
pub const GRADIENT_BOOSTING_FILE: &str = "gradient_boosting.toml";
pub const LOGISTIC_REGRESSION_FILE: &str = "logistic_regression.toml";
pub const FEATURES_FILE: &str = "features.toml";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Model files not found in {}: {}. Run `labrisk train` first.", dir.display(), files.join(", "))]
    Missing { dir: PathBuf, files: Vec<String> },
    #[error("Failed to read or write artifact file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse artifact {}: {source}", path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize artifact to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid feature schema snapshot: {0}")]
    Schema(#[from] SchemaError),
    #[error("The {artifact} is corrupt: {source}")]
    Corrupt {
        artifact: &'static str,
        #[source]
        source: ModelError,
    },
    #[error("The {artifact} expects {found} {what}, but {expected} were required.")]
    Inconsistent {
        artifact: &'static str,
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Locations of the four artifact files in a model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub scaler: PathBuf,
    pub gradient_boosting: PathBuf,
    pub logistic_regression: PathBuf,
    pub features: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            scaler: dir.join(SCALER_FILE),
            gradient_boosting: dir.join(GRADIENT_BOOSTING_FILE),
            logistic_regression: dir.join(LOGISTIC_REGRESSION_FILE),
            features: dir.join(FEATURES_FILE),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.scaler,
            &self.gradient_boosting,
            &self.logistic_regression,
            &self.features,
        ]
    }

    /// File names of the artifacts that do not exist on disk.
    pub fn missing(&self) -> Vec<String> {
        self.all()
            .iter()
            .filter(|path| !path.is_file())
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }
}

/// On-disk layout of `features.toml`.
#[derive(Debug, Serialize, Deserialize)]
struct FeatureList {
    features: Vec<String>,
}

/// Everything produced by one training run and needed to score requests.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedArtifacts {
    pub scaler: StandardScaler,
    pub gradient_boosting: GradientBoostingClassifier,
    pub logistic_regression: LogisticRegression,
    pub schema: FeatureSchema,
}

impl FittedArtifacts {
    /// Checks that each artifact is internally well formed, that every
    /// artifact agrees on the feature count, and that both classifiers emit
    /// one probability per risk tier.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let structure = [
            ("scaler", self.scaler.validate()),
            ("gradient boosting classifier", self.gradient_boosting.validate()),
            ("logistic regression classifier", self.logistic_regression.validate()),
        ];
        for (artifact, checked) in structure {
            checked.map_err(|source| ArtifactError::Corrupt { artifact, source })?;
        }

        let expected = self.schema.len();
        let widths = [
            ("scaler", self.scaler.n_features()),
            ("gradient boosting classifier", self.gradient_boosting.n_features()),
            ("logistic regression classifier", self.logistic_regression.n_features()),
        ];
        for (artifact, found) in widths {
            if found != expected {
                return Err(ArtifactError::Inconsistent {
                    artifact,
                    what: "features",
                    expected,
                    found,
                });
            }
        }
        let classes = [
            ("gradient boosting classifier", self.gradient_boosting.n_classes()),
            ("logistic regression classifier", self.logistic_regression.n_classes()),
        ];
        for (artifact, found) in classes {
            if found != RiskTier::ALL.len() {
                return Err(ArtifactError::Inconsistent {
                    artifact,
                    what: "classes",
                    expected: RiskTier::ALL.len(),
                    found,
                });
            }
        }
        Ok(())
    }

    /// Writes all four artifacts into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<ArtifactPaths, ArtifactError> {
        fs::create_dir_all(dir)?;
        let paths = ArtifactPaths::in_dir(dir);
        write_toml(&paths.scaler, &self.scaler)?;
        write_toml(&paths.gradient_boosting, &self.gradient_boosting)?;
        write_toml(&paths.logistic_regression, &self.logistic_regression)?;
        let names = FeatureList {
            features: self.schema.names().into_iter().map(String::from).collect(),
        };
        write_toml(&paths.features, &names)?;
        Ok(paths)
    }

    /// Loads and validates the four artifacts from `dir`. Any missing file is
    /// reported up front, before anything is parsed.
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let paths = ArtifactPaths::in_dir(dir);
        let missing = paths.missing();
        if !missing.is_empty() {
            return Err(ArtifactError::Missing {
                dir: dir.to_path_buf(),
                files: missing,
            });
        }

        let names: FeatureList = read_toml(&paths.features)?;
        let artifacts = Self {
            scaler: read_toml(&paths.scaler)?,
            gradient_boosting: read_toml(&paths.gradient_boosting)?,
            logistic_regression: read_toml(&paths.logistic_regression)?,
            schema: FeatureSchema::from_names(names.features.as_slice())?,
        };
        artifacts.validate()?;
        log::info!(
            "Loaded model artifacts from {} ({} features)",
            dir.display(),
            artifacts.schema.len()
        );
        Ok(artifacts)
    }
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let toml_string = toml::to_string_pretty(value)?;
    let mut file = BufWriter::new(fs::File::create(path)?);
    file.write_all(toml_string.as_bytes())?;
    file.flush()?;
    Ok(())
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let toml_string = fs::read_to_string(path)?;
    toml::from_str(&toml_string).map_err(|source| ArtifactError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}
