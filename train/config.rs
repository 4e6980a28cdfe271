use crate::model::boosting::BoostingParams;
use crate::model::classifier::ModelError;
use crate::model::logistic::LogisticParams;
use crate::panel::PanelType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read training config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse training config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid training config: '{name}' {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Everything that determines a training run. Two runs with equal configs
/// produce identical artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Total rows to synthesize; split evenly across the three panels.
    pub samples: usize,
    pub seed: u64,
    pub test_fraction: f64,
    pub boosting: BoostingParams,
    pub logistic: LogisticParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            samples: 10_000,
            seed: 42,
            test_fraction: 0.2,
            boosting: BoostingParams::default(),
            logistic: LogisticParams::default(),
        }
    }
}

impl TrainingConfig {
    /// Reads a config from TOML. Omitted keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples < PanelType::ALL.len() {
            return Err(ConfigError::Invalid {
                name: "samples",
                reason: format!(
                    "must be at least {} (one row per panel), got {}",
                    PanelType::ALL.len(),
                    self.samples
                ),
            });
        }
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(ConfigError::Invalid {
                name: "test_fraction",
                reason: format!("must lie in [0, 1), got {}", self.test_fraction),
            });
        }
        self.boosting.validate()?;
        self.logistic.validate()?;
        Ok(())
    }
}
