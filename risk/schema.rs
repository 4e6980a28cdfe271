//! # Feature Schema
//!
//! The single source of truth for the column layout consumed by the scaler and
//! the classifiers. Both the training-time synthesizer and the request-time
//! feature builder derive their vectors from this module, so the column order
//! and the population-normal defaults cannot drift between the two.
//!
//! - Column order is what the fitted artifacts key on, not column names. A
//!   persisted schema snapshot is therefore validated against the closed
//!   [`Feature`] set when it is loaded.
//! - Defaults live on [`Feature::default_value`] and nowhere else.

use ndarray::{Array1, Array2};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// A single row of model input, laid out in schema order.
pub type FeatureVector = Array1<f64>;

/// A row-major matrix of model inputs. Shape: `[n_samples, n_features]`.
pub type FeatureMatrix = Array2<f64>;

/// Number of slots in the canonical schema.
pub const FEATURE_COUNT: usize = 19;

/// One named slot of the feature schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    LabType,
    Wbc,
    Rbc,
    Hemoglobin,
    Platelets,
    Cholesterol,
    Hdl,
    Ldl,
    Triglycerides,
    Vldl,
    Glucose,
    A1c,
    Ph,
    SpecificGravity,
    Protein,
    Ketones,
    Blood,
    Nitrites,
    LeukocyteEsterase,
}

/// The clinical grouping a feature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    /// The panel identifier itself (`lab_type`).
    Panel,
    Cbc,
    Lipid,
    Glucose,
    Urinalysis,
}

/// The canonical training-time column order.
pub const CANONICAL_FEATURES: [Feature; FEATURE_COUNT] = [
    Feature::LabType,
    Feature::Wbc,
    Feature::Rbc,
    Feature::Hemoglobin,
    Feature::Platelets,
    Feature::Cholesterol,
    Feature::Hdl,
    Feature::Ldl,
    Feature::Triglycerides,
    Feature::Vldl,
    Feature::Glucose,
    Feature::A1c,
    Feature::Ph,
    Feature::SpecificGravity,
    Feature::Protein,
    Feature::Ketones,
    Feature::Blood,
    Feature::Nitrites,
    Feature::LeukocyteEsterase,
];

impl Feature {
    /// The wire name used in requests, CSV headers and the persisted schema.
    pub fn name(self) -> &'static str {
        match self {
            Self::LabType => "lab_type",
            Self::Wbc => "wbc",
            Self::Rbc => "rbc",
            Self::Hemoglobin => "hemoglobin",
            Self::Platelets => "platelets",
            Self::Cholesterol => "cholesterol",
            Self::Hdl => "hdl",
            Self::Ldl => "ldl",
            Self::Triglycerides => "triglycerides",
            Self::Vldl => "vldl",
            Self::Glucose => "glucose",
            Self::A1c => "a1c",
            Self::Ph => "ph",
            Self::SpecificGravity => "specific_gravity",
            Self::Protein => "protein",
            Self::Ketones => "ketones",
            Self::Blood => "blood",
            Self::Nitrites => "nitrites",
            Self::LeukocyteEsterase => "leukocyte_esterase",
        }
    }

    /// Looks a feature up by its exact wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        CANONICAL_FEATURES.iter().copied().find(|f| f.name() == name)
    }

    /// Population-normal value used whenever a slot is not drawn by the
    /// synthesizer or not supplied by a request.
    pub fn default_value(self) -> f64 {
        match self {
            Self::LabType => 0.0,
            Self::Wbc => 7.5,
            Self::Rbc => 4.7,
            Self::Hemoglobin => 14.0,
            Self::Platelets => 250.0,
            Self::Cholesterol => 180.0,
            Self::Hdl => 55.0,
            Self::Ldl => 100.0,
            Self::Triglycerides => 140.0,
            Self::Vldl => 28.0,
            Self::Glucose => 95.0,
            Self::A1c => 5.4,
            Self::Ph => 6.0,
            Self::SpecificGravity => 1.015,
            Self::Protein
            | Self::Ketones
            | Self::Blood
            | Self::Nitrites
            | Self::LeukocyteEsterase => 0.0,
        }
    }

    pub fn group(self) -> FeatureGroup {
        match self {
            Self::LabType => FeatureGroup::Panel,
            Self::Wbc | Self::Rbc | Self::Hemoglobin | Self::Platelets => FeatureGroup::Cbc,
            Self::Cholesterol | Self::Hdl | Self::Ldl | Self::Triglycerides | Self::Vldl => {
                FeatureGroup::Lipid
            }
            Self::Glucose | Self::A1c => FeatureGroup::Glucose,
            Self::Ph
            | Self::SpecificGravity
            | Self::Protein
            | Self::Ketones
            | Self::Blood
            | Self::Nitrites
            | Self::LeukocyteEsterase => FeatureGroup::Urinalysis,
        }
    }

    /// Position of this feature in [`CANONICAL_FEATURES`].
    pub fn canonical_index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("The feature schema is empty.")]
    Empty,
    #[error("Unknown feature '{0}' in schema. The model was trained with an incompatible feature set.")]
    UnknownFeature(String),
    #[error("Feature '{0}' appears more than once in the schema.")]
    DuplicateFeature(String),
}

/// An ordered list of features. Vectors built against a schema always have
/// exactly `schema.len()` entries in `schema` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    /// The schema every training run is synthesized in.
    pub fn canonical() -> Self {
        Self {
            features: CANONICAL_FEATURES.to_vec(),
        }
    }

    /// Rebuilds a schema from a persisted name list, rejecting names outside
    /// the known feature set and duplicates.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, SchemaError> {
        if names.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::with_capacity(names.len());
        let mut features = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let feature = Feature::from_name(name)
                .ok_or_else(|| SchemaError::UnknownFeature(name.to_string()))?;
            if !seen.insert(feature) {
                return Err(SchemaError::DuplicateFeature(name.to_string()));
            }
            features.push(feature);
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::canonical()
    }
}
