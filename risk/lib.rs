#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod panel;
pub mod request;
pub mod schema;
pub mod scoring;
pub mod value;

// Learning primitives and the artifact store
#[path = "../model/mod.rs"]
pub mod model;

// Offline synthesis and training
#[path = "../train/mod.rs"]
pub mod train;

pub use panel::{PanelType, RiskTier, resolve_panel};
pub use request::{LabRequest, RequestError, build_feature_vector};
pub use schema::{Feature, FeatureMatrix, FeatureSchema, FeatureVector};
pub use scoring::{InferenceContext, PredictionResponse, PredictionResult, ScoringError};
pub use train::synth::synthesize_training_set;
pub use value::{LabValue, normalize};
