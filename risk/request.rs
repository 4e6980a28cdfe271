//! # Request Feature Builder
//!
//! Turns a client's sparse lab report into a feature vector laid out exactly
//! like the training matrix.
//!
//! Every schema slot is filled, whatever panel the request names: slots the
//! client did not report take the shared population-normal default from
//! [`Feature::default_value`]. The panel only decides the `lab_type` slot.
//! This mirrors the synthesized training rows, where the other panels' groups
//! sit at the same defaults.

use crate::panel::{PanelType, resolve_panel};
use crate::schema::{Feature, FeatureSchema, FeatureVector};
use crate::value::LabValue;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Label used when a request does not name its panel.
pub const DEFAULT_LAB_TYPE: &str = "cbc";

static ABSENT: LabValue = LabValue::Absent;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("No data provided")]
    Empty,
    #[error("Request body must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// A validated inference request: an optional panel label and the reported
/// lab values keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabRequest {
    lab_type: Option<String>,
    values: BTreeMap<String, LabValue>,
}

impl LabRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lab_type(mut self, lab_type: impl Into<String>) -> Self {
        self.lab_type = Some(lab_type.into());
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<LabValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Parses a raw request body.
    pub fn from_json_str(body: &str) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_json(&value)
    }

    /// Validates a decoded request body. Absent, non-object and empty bodies
    /// are rejected; individual fields are never rejected.
    pub fn from_json(body: &Value) -> Result<Self, RequestError> {
        match body {
            Value::Object(map) if map.is_empty() => Err(RequestError::Empty),
            Value::Object(map) => Ok(Self::from_map(map)),
            Value::Null => Err(RequestError::Empty),
            other => Err(RequestError::NotAnObject(json_type_name(other))),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        // A non-string lab_type carries no label and falls back like an absent one.
        let lab_type = match map.get(Feature::LabType.name()) {
            Some(Value::String(label)) => Some(label.clone()),
            Some(other) => {
                log::warn!(
                    "Ignoring non-string lab_type of type {}",
                    json_type_name(other)
                );
                None
            }
            None => None,
        };
        let values = map
            .iter()
            .filter(|(key, _)| key.as_str() != Feature::LabType.name())
            .map(|(key, value)| (key.clone(), LabValue::from_json(Some(value))))
            .collect();
        Self { lab_type, values }
    }

    pub fn lab_type(&self) -> Option<&str> {
        self.lab_type.as_deref()
    }

    /// The panel this request resolves to.
    pub fn panel(&self) -> PanelType {
        resolve_panel(self.lab_type().unwrap_or(DEFAULT_LAB_TYPE))
    }

    pub fn value(&self, field: &str) -> &LabValue {
        self.values.get(field).unwrap_or(&ABSENT)
    }

    /// Field names present in the request, `lab_type` included.
    pub fn keys(&self) -> Vec<&str> {
        self.lab_type
            .as_ref()
            .map(|_| Feature::LabType.name())
            .into_iter()
            .chain(self.values.keys().map(String::as_str))
            .collect()
    }
}

/// Builds the model input for `request` in `schema` order.
///
/// Fields the schema does not name (differential counts, free-form extras)
/// are ignored.
pub fn build_feature_vector(request: &LabRequest, schema: &FeatureSchema) -> FeatureVector {
    let panel = request.panel();
    schema
        .features()
        .iter()
        .map(|&feature| match feature {
            Feature::LabType => panel.index() as f64,
            _ => request
                .value(feature.name())
                .normalize(feature.default_value()),
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CANONICAL_FEATURES;
    use serde_json::json;

    #[test]
    fn vector_follows_schema_for_every_panel() {
        let schema = FeatureSchema::canonical();
        for panel in PanelType::ALL {
            let request = LabRequest::new().with_lab_type(panel.name());
            let vector = build_feature_vector(&request, &schema);
            assert_eq!(vector.len(), schema.len());
            assert_eq!(vector[0], panel.index() as f64);
            for (i, feature) in CANONICAL_FEATURES.iter().enumerate().skip(1) {
                assert_eq!(vector[i], feature.default_value(), "slot {feature}");
            }
        }
    }

    #[test]
    fn reported_values_override_defaults_in_every_group() {
        let body = json!({
            "lab_type": "Lipid Profile",
            "hdl": 38,
            "ldl": "171",
            "wbc": 12.5,
            "nitrites": "Positive",
            "protein": "negative",
            "ketones": "cloudy",
        });
        let request = LabRequest::from_json(&body).unwrap();
        let schema = FeatureSchema::canonical();
        let vector = build_feature_vector(&request, &schema);

        let at = |f: Feature| vector[f.canonical_index()];
        assert_eq!(at(Feature::LabType), 2.0);
        assert_eq!(at(Feature::Hdl), 38.0);
        assert_eq!(at(Feature::Ldl), 171.0);
        assert_eq!(at(Feature::Wbc), 12.5);
        assert_eq!(at(Feature::Nitrites), 1.0);
        assert_eq!(at(Feature::Protein), 0.0);
        assert_eq!(at(Feature::Ketones), Feature::Ketones.default_value());
        assert_eq!(at(Feature::Glucose), 95.0);
    }

    #[test]
    fn missing_lab_type_defaults_to_cbc() {
        let request = LabRequest::from_json(&json!({"glucose": 140})).unwrap();
        assert_eq!(request.lab_type(), None);
        assert_eq!(request.panel(), PanelType::Cbc);

        let numeric_label = LabRequest::from_json(&json!({"lab_type": 2})).unwrap();
        assert_eq!(numeric_label.panel(), PanelType::Cbc);
    }

    #[test]
    fn differential_counts_never_enter_the_vector() {
        let schema = FeatureSchema::canonical();
        let request = LabRequest::from_json(&json!({
            "lab_type": "cbc",
            "neutrophils": 0.7,
            "basophils": 0.01,
        }))
        .unwrap();
        let vector = build_feature_vector(&request, &schema);
        assert_eq!(vector.len(), 19);
        for (value, feature) in vector.iter().zip(schema.features()) {
            assert_eq!(*value, feature.default_value(), "slot {feature}");
        }
    }

    #[test]
    fn vector_follows_a_permuted_snapshot() {
        let schema = FeatureSchema::from_names(&["glucose", "lab_type", "hdl"]).unwrap();
        let request = LabRequest::new()
            .with_lab_type("urine")
            .with_value("hdl", 61.0)
            .with_value("glucose", "trace");
        let vector = build_feature_vector(&request, &schema);
        assert_eq!(vector.to_vec(), vec![1.0, 1.0, 61.0]);
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert!(matches!(
            LabRequest::from_json(&json!({})),
            Err(RequestError::Empty)
        ));
        assert!(matches!(
            LabRequest::from_json(&Value::Null),
            Err(RequestError::Empty)
        ));
        assert!(matches!(
            LabRequest::from_json(&json!([1, 2, 3])),
            Err(RequestError::NotAnObject("an array"))
        ));
        assert!(matches!(
            LabRequest::from_json_str("{\"wbc\": "),
            Err(RequestError::InvalidJson(_))
        ));
    }

    #[test]
    fn keys_list_lab_type_first() {
        let request = LabRequest::from_json(&json!({"wbc": 1, "lab_type": "cbc", "a1c": 6}))
            .unwrap();
        assert_eq!(request.keys(), vec!["lab_type", "a1c", "wbc"]);
    }
}
