//! # Training Table Persistence
//!
//! The synthesized table is written as a comma-separated file with a header
//! row: the feature names in schema order followed by `risk_level`, which
//! holds the tier index (0, 1 or 2). Reading a table back enforces the same
//! header exactly, so a table written by one schema can never be fitted
//! against another.

use crate::panel::RiskTier;
use crate::schema::{FeatureMatrix, FeatureSchema};
use crate::train::synth::TrainingSet;
use ndarray::{Array1, Array2};
use std::path::Path;
use thiserror::Error;

/// Name of the trailing label column.
pub const LABEL_COLUMN: &str = "risk_level";

/// A comprehensive error type for training-table I/O and validation.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Error from the CSV reader or writer: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not assemble the feature matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("The table header does not match the feature schema. Expected [{expected}], found [{found}].")]
    HeaderMismatch { expected: String, found: String },
    #[error("Row {row}, column '{column}': '{value}' is not a finite number.")]
    BadValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Row {row}: '{value}' is not a risk level (expected 0, 1 or 2).")]
    BadLabel { row: usize, value: String },
    #[error("Row {row} has {found} fields but the header has {expected}.")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// A feature matrix with its tier labels, laid out by `schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTable {
    pub schema: FeatureSchema,
    pub features: FeatureMatrix,
    pub labels: Array1<usize>,
}

impl TrainingTable {
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    fn header(schema: &FeatureSchema) -> Vec<&'static str> {
        let mut header = schema.names();
        header.push(LABEL_COLUMN);
        header
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(Self::header(&self.schema))?;
        for (row, label) in self.features.rows().into_iter().zip(self.labels.iter()) {
            let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            record.push(label.to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        log::info!("Wrote {} rows to {}", self.n_rows(), path.display());
        Ok(())
    }

    /// Reads a table written by [`TrainingTable::write_csv`] for `schema`.
    pub fn read_csv(path: &Path, schema: &FeatureSchema) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let expected = Self::header(schema);
        let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if found != expected {
            return Err(TableError::HeaderMismatch {
                expected: expected.join(", "),
                found: found.join(", "),
            });
        }

        let width = schema.len();
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            // 1-based, counting the header
            let row = i + 2;
            if record.len() != width + 1 {
                return Err(TableError::RaggedRow {
                    row,
                    expected: width + 1,
                    found: record.len(),
                });
            }
            for (field, column) in record.iter().take(width).zip(&expected) {
                let value = field
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| TableError::BadValue {
                        row,
                        column: column.to_string(),
                        value: field.to_string(),
                    })?;
                values.push(value);
            }
            let raw_label = &record[width];
            let label = raw_label
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(RiskTier::from_index)
                .ok_or_else(|| TableError::BadLabel {
                    row,
                    value: raw_label.to_string(),
                })?;
            labels.push(label.index());
        }

        let features = Array2::from_shape_vec((labels.len(), width), values)?;
        Ok(Self {
            schema: schema.clone(),
            features,
            labels: Array1::from(labels),
        })
    }
}

impl From<&TrainingSet> for TrainingTable {
    fn from(set: &TrainingSet) -> Self {
        Self {
            schema: set.schema(),
            features: set.features(),
            labels: set.labels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::synth::synthesize;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn written_table_reads_back_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("synthetic_data_30.csv");
        let set = synthesize(30, &mut StdRng::seed_from_u64(4)).unwrap();
        let table = TrainingTable::from(&set);
        table.write_csv(&path).unwrap();

        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("lab_type,wbc,rbc,hemoglobin,platelets,"));
        assert!(header.lines().next().unwrap().ends_with(",leukocyte_esterase,risk_level"));

        let back = TrainingTable::read_csv(&path, &FeatureSchema::canonical()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn header_must_match_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "wbc,lab_type,risk_level\n7.5,0,0\n").unwrap();
        let schema = FeatureSchema::from_names(&["lab_type", "wbc"]).unwrap();
        assert!(matches!(
            TrainingTable::read_csv(&path, &schema),
            Err(TableError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn rejects_bad_values_and_labels() {
        let dir = tempdir().unwrap();
        let schema = FeatureSchema::from_names(&["lab_type", "wbc"]).unwrap();

        let path = dir.path().join("values.csv");
        fs::write(&path, "lab_type,wbc,risk_level\n0,7.5,0\n1,high,2\n").unwrap();
        match TrainingTable::read_csv(&path, &schema) {
            Err(TableError::BadValue { row, column, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(column, "wbc");
            }
            other => panic!("expected a bad value, got {other:?}"),
        }

        let path = dir.path().join("labels.csv");
        fs::write(&path, "lab_type,wbc,risk_level\n0,7.5,3\n").unwrap();
        assert!(matches!(
            TrainingTable::read_csv(&path, &schema),
            Err(TableError::BadLabel { row: 2, .. })
        ));
    }
}
