//! Conversion of loosely-typed lab values into model inputs.
//!
//! Clients report the same quantity in several shapes: a JSON number, a
//! numeric string, or a qualitative dipstick token such as `"trace"`.
//! [`LabValue`] captures those shapes explicitly and [`normalize`] maps each of
//! them to a float. Normalization is total: an unusable value falls back to the
//! caller's default instead of failing the request.

use serde_json::Value;

/// A raw lab value as supplied by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum LabValue {
    /// A JSON number, or a string that parses as one.
    Numeric(f64),
    /// A non-numeric string, e.g. a dipstick result like `"Trace"`.
    Token(String),
    /// Not supplied, `null`, or a JSON type with no numeric reading.
    Absent,
}

impl LabValue {
    /// Classifies an optional JSON value.
    ///
    /// Booleans, arrays and objects carry no lab reading and become
    /// [`LabValue::Absent`].
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(number)) => number.as_f64().map_or(Self::Absent, Self::Numeric),
            Some(Value::String(text)) => Self::from(text.as_str()),
            _ => Self::Absent,
        }
    }

    /// See [`normalize`].
    pub fn normalize(&self, default: f64) -> f64 {
        match self {
            Self::Absent => default,
            Self::Numeric(value) => *value,
            Self::Token(token) => qualitative_reading(token).unwrap_or(default),
        }
    }
}

impl From<f64> for LabValue {
    fn from(value: f64) -> Self {
        Self::Numeric(value)
    }
}

impl From<&str> for LabValue {
    /// Numeric strings tolerate surrounding whitespace; tokens are kept verbatim.
    fn from(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(value) => Self::Numeric(value),
            Err(_) => Self::Token(text.to_string()),
        }
    }
}

impl<T: Into<LabValue>> From<Option<T>> for LabValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

/// Converts a raw lab value to a float, substituting `default` when the value
/// is absent or unreadable.
///
/// - numbers and numeric strings pass through unchanged
/// - `"positive"` and `"trace"` read as `1.0`, `"negative"` as `0.0`
///   (case-insensitive)
/// - anything else yields `default`
pub fn normalize(value: &LabValue, default: f64) -> f64 {
    value.normalize(default)
}

fn qualitative_reading(token: &str) -> Option<f64> {
    if token.eq_ignore_ascii_case("positive") || token.eq_ignore_ascii_case("trace") {
        Some(1.0)
    } else if token.eq_ignore_ascii_case("negative") {
        Some(0.0)
    } else {
        None
    }
}
