//! # Scaling & Scoring
//!
//! The inference half of the pipeline. An [`InferenceContext`] owns one
//! complete, validated set of fitted artifacts and is never mutated after it
//! is built, so a single context can be shared by reference across threads.
//!
//! Scoring a feature vector standardizes it with the fitted scaler, asks the
//! gradient boosting classifier for the three tier probabilities and derives:
//!
//! - the tier, as the arg-max of the probabilities (first maximum wins);
//! - the confidence, `round(100 * p[tier])`;
//! - the risk score, `floor(100 * (0.15 * p_low + 0.50 * p_moderate + 0.85 * p_high))`.

use crate::model::artifacts::{ArtifactError, FittedArtifacts};
use crate::model::classifier::{Classifier, ModelError, argmax};
use crate::panel::RiskTier;
use crate::request::{LabRequest, build_feature_vector};
use crate::schema::{FeatureMatrix, FeatureSchema, FeatureVector};
use ndarray::{ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Identifier reported with every prediction.
pub const MODEL_NAME: &str = "gradient_boosting_unified";

pub const SERVICE_NAME: &str = "labrisk";

#[derive(Error, Debug, PartialEq)]
pub enum ScoringError {
    #[error("Feature vector has {found} entries but the model expects {expected}.")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Feature '{feature}' is not a finite number.")]
    NonFiniteFeature { feature: &'static str },
    #[error("Model evaluation failed: {0}")]
    Model(#[from] ModelError),
    #[error("Classifier produced a non-finite probability for the {0} tier.")]
    NonFinite(RiskTier),
    #[error("Classifier produced {0} probabilities; expected one per risk tier.")]
    WrongClassCount(usize),
}

/// Per-tier probabilities, in tier order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierProbabilities {
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
}

impl TierProbabilities {
    pub fn as_array(&self) -> [f64; 3] {
        [self.low, self.moderate, self.high]
    }
}

impl From<[f64; 3]> for TierProbabilities {
    fn from(p: [f64; 3]) -> Self {
        Self {
            low: p[0],
            moderate: p[1],
            high: p[2],
        }
    }
}

/// The outcome of scoring one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub tier: RiskTier,
    /// Severity-weighted blend of the probabilities, 0 to 100.
    pub risk_score: u8,
    /// Probability of the chosen tier as a percentage.
    pub confidence: u8,
    pub probabilities: TierProbabilities,
}

impl PredictionResult {
    /// Derives tier, confidence and risk score from a probability triple.
    pub fn from_probabilities(p: [f64; 3]) -> Result<Self, ScoringError> {
        if let Some(k) = p.iter().position(|v| !v.is_finite()) {
            // k < 3, so the tier always exists.
            return Err(ScoringError::NonFinite(RiskTier::ALL[k]));
        }
        let tier = RiskTier::ALL[argmax(ArrayView1::from(&p[..]))];

        let blend = RiskTier::ALL
            .iter()
            .zip(p)
            .fold(0.0, |acc, (tier, prob)| acc + prob * tier.severity_weight());
        let risk_score = (100.0 * blend).floor().clamp(0.0, 100.0) as u8;
        let confidence = (100.0 * p[tier.index()]).round().clamp(0.0, 100.0) as u8;

        Ok(Self {
            tier,
            risk_score,
            confidence,
            probabilities: p.into(),
        })
    }

    pub fn to_response(&self) -> PredictionResponse {
        PredictionResponse {
            risk_level: self.tier,
            risk_score: self.risk_score,
            confidence: self.confidence,
            model: MODEL_NAME.to_string(),
            probabilities: self.probabilities,
        }
    }
}

/// Wire form of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub risk_level: RiskTier,
    pub risk_score: u8,
    pub confidence: u8,
    pub model: String,
    pub probabilities: TierProbabilities,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        result.to_response()
    }
}

/// Service readiness as reported by `labrisk health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub models_loaded: bool,
    pub service: String,
    pub version: String,
}

impl HealthReport {
    pub fn new(models_loaded: bool) -> Self {
        Self {
            status: if models_loaded { "healthy" } else { "unhealthy" }.to_string(),
            models_loaded,
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Attempts a full artifact load from `dir`; any failure is logged and
    /// reported as unhealthy.
    pub fn check(dir: &Path) -> Self {
        match InferenceContext::load(dir) {
            Ok(_) => Self::new(true),
            Err(e) => {
                log::warn!("Model artifacts unavailable: {e}");
                Self::new(false)
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.models_loaded
    }
}

/// Immutable scoring state built from one complete artifact set.
#[derive(Debug, Clone)]
pub struct InferenceContext {
    artifacts: FittedArtifacts,
}

impl InferenceContext {
    pub fn new(artifacts: FittedArtifacts) -> Result<Self, ArtifactError> {
        artifacts.validate()?;
        Ok(Self { artifacts })
    }

    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        Ok(Self {
            artifacts: FittedArtifacts::load(dir)?,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.artifacts.schema
    }

    /// Builds the model input for `request` in the persisted schema order.
    pub fn build_features(&self, request: &LabRequest) -> FeatureVector {
        build_feature_vector(request, self.schema())
    }

    pub fn score(&self, features: &FeatureVector) -> Result<PredictionResult, ScoringError> {
        let expected = self.schema().len();
        if features.len() != expected {
            return Err(ScoringError::DimensionMismatch {
                expected,
                found: features.len(),
            });
        }
        self.check_finite(features.view())?;
        let scaled = self.artifacts.scaler.transform_row(features.view())?;
        let batch = scaled.insert_axis(Axis(0));
        let proba = self.artifacts.gradient_boosting.predict_proba(batch.view())?;
        probabilities_to_result(proba.row(0))
    }

    pub fn predict(&self, request: &LabRequest) -> Result<PredictionResult, ScoringError> {
        let features = self.build_features(request);
        log::debug!(
            "Scoring {} request with fields {:?}",
            request.panel(),
            request.keys()
        );
        self.score(&features)
    }

    /// Scores every row of `features`. Rows are evaluated in parallel and
    /// returned in input order. A single non-finite entry fails the batch.
    pub fn score_batch(&self, features: &FeatureMatrix) -> Result<Vec<PredictionResult>, ScoringError> {
        let expected = self.schema().len();
        if features.ncols() != expected {
            return Err(ScoringError::DimensionMismatch {
                expected,
                found: features.ncols(),
            });
        }
        for row in features.rows() {
            self.check_finite(row)?;
        }
        let scaled = self.artifacts.scaler.transform(features.view())?;
        let proba = self.artifacts.gradient_boosting.predict_proba(scaled.view())?;
        proba
            .axis_iter(Axis(0))
            .map(probabilities_to_result)
            .collect()
    }

    /// Names the first slot of `row` holding NaN or an infinity.
    fn check_finite(&self, row: ArrayView1<f64>) -> Result<(), ScoringError> {
        match row
            .iter()
            .zip(self.schema().features())
            .find(|(value, _)| !value.is_finite())
        {
            Some((_, feature)) => Err(ScoringError::NonFiniteFeature {
                feature: feature.name(),
            }),
            None => Ok(()),
        }
    }
}

fn probabilities_to_result(row: ArrayView1<f64>) -> Result<PredictionResult, ScoringError> {
    let p: [f64; 3] = row
        .to_vec()
        .try_into()
        .map_err(|v: Vec<f64>| ScoringError::WrongClassCount(v.len()))?;
    PredictionResult::from_probabilities(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_example_scores_low() {
        let result = PredictionResult::from_probabilities([0.7, 0.2, 0.1]).unwrap();
        assert_eq!(result.tier, RiskTier::Low);
        assert_eq!(result.confidence, 70);
        assert_eq!(result.risk_score, 29);
    }

    #[test]
    fn certain_high_scores_eighty_five() {
        let result = PredictionResult::from_probabilities([0.0, 0.0, 1.0]).unwrap();
        assert_eq!(result.tier, RiskTier::High);
        assert_eq!(result.confidence, 100);
        assert_eq!(result.risk_score, 85);
    }

    #[test]
    fn ties_resolve_to_the_lower_tier() {
        let result = PredictionResult::from_probabilities([0.1, 0.45, 0.45]).unwrap();
        assert_eq!(result.tier, RiskTier::Moderate);
        assert_eq!(result.confidence, 45);
    }

    #[test]
    fn non_finite_probabilities_are_rejected() {
        assert_eq!(
            PredictionResult::from_probabilities([0.5, f64::NAN, 0.5]),
            Err(ScoringError::NonFinite(RiskTier::Moderate))
        );
    }

    #[test]
    fn response_uses_camel_case_fields() {
        let response = PredictionResult::from_probabilities([0.2, 0.3, 0.5])
            .unwrap()
            .to_response();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["riskLevel"], "high");
        assert_eq!(json["riskScore"], 60);
        assert_eq!(json["confidence"], 50);
        assert_eq!(json["model"], MODEL_NAME);
        assert_eq!(json["probabilities"]["moderate"], 0.3);
    }

    #[test]
    fn health_report_reflects_load_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let report = HealthReport::check(dir.path());
        assert_eq!(report.status, "unhealthy");
        assert!(!report.is_healthy());
        assert_eq!(HealthReport::new(true).status, "healthy");
    }
}
