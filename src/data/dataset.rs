//! Requirement dataset loading and splitting
//!
//! Rows come from CSV files with the schema
//! `id,text,missing_auth,missing_authz,missing_encryption,missing_validation,missing_audit,missing_ratelimit,category`.
//! Loading is strict: a malformed row fails the whole load rather than being
//! dropped. Augmented corpora share the schema and are treated identically;
//! the loader only prefers the augmented file when one exists.

use ndarray::{Array2, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::labels::{RiskCategory, N_RISK_CATEGORIES};
use crate::error::{Error, Result};

/// One labeled requirement statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub id: u64,
    pub text: String,
    pub missing_auth: u8,
    pub missing_authz: u8,
    pub missing_encryption: u8,
    pub missing_validation: u8,
    pub missing_audit: u8,
    pub missing_ratelimit: u8,
    pub category: String,
}

impl RequirementRecord {
    /// Label values in the fixed category order.
    pub fn labels(&self) -> [f64; N_RISK_CATEGORIES] {
        [
            f64::from(self.missing_auth),
            f64::from(self.missing_authz),
            f64::from(self.missing_encryption),
            f64::from(self.missing_validation),
            f64::from(self.missing_audit),
            f64::from(self.missing_ratelimit),
        ]
    }

    fn raw_labels(&self) -> [u8; N_RISK_CATEGORIES] {
        [
            self.missing_auth,
            self.missing_authz,
            self.missing_encryption,
            self.missing_validation,
            self.missing_audit,
            self.missing_ratelimit,
        ]
    }
}

/// An immutable collection of requirement samples.
#[derive(Debug, Clone)]
pub struct RequirementDataset {
    records: Vec<RequirementRecord>,
}

impl RequirementDataset {
    /// Load and validate a dataset from a CSV file.
    ///
    /// Fails on the first empty text, non-binary label value, or duplicate
    /// id; no row-level recovery is attempted.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;

        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();

        for (idx, row) in reader.deserialize::<RequirementRecord>().enumerate() {
            let row_no = idx + 1;
            let record = row?;

            if record.text.trim().is_empty() {
                return Err(Error::EmptyText { row: row_no });
            }
            for (category, value) in RiskCategory::ALL.iter().zip(record.raw_labels()) {
                if value > 1 {
                    return Err(Error::InvalidLabel {
                        row: row_no,
                        column: category.column(),
                        value,
                    });
                }
            }
            if !seen_ids.insert(record.id) {
                return Err(Error::DuplicateId {
                    row: row_no,
                    id: record.id,
                });
            }

            records.push(record);
        }

        if records.is_empty() {
            return Err(Error::EmptyDataset {
                path: path.to_path_buf(),
            });
        }

        Ok(Self { records })
    }

    /// Load the augmented corpus when it exists, the raw corpus otherwise.
    pub fn load_preferring_augmented<P: AsRef<Path>>(raw: P, augmented: P) -> Result<Self> {
        let raw = raw.as_ref();
        let augmented = augmented.as_ref();

        let chosen = if augmented.exists() { augmented } else { raw };
        let dataset = Self::from_csv(chosen)?;
        info!(
            path = %chosen.display(),
            rows = dataset.len(),
            "loaded requirement dataset"
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RequirementRecord] {
        &self.records
    }

    /// Requirement texts, row order preserved.
    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|r| r.text.clone()).collect()
    }

    /// Label matrix of shape `(n_rows, 6)` in the fixed category order.
    pub fn label_matrix(&self) -> Array2<f64> {
        let mut labels = Array2::zeros((self.records.len(), N_RISK_CATEGORIES));
        for (i, record) in self.records.iter().enumerate() {
            for (j, value) in record.labels().iter().enumerate() {
                labels[[i, j]] = *value;
            }
        }
        labels
    }

    /// Positive-example count per category, in the fixed order.
    pub fn label_counts(&self) -> [usize; N_RISK_CATEGORIES] {
        let mut counts = [0usize; N_RISK_CATEGORIES];
        for record in &self.records {
            for (count, value) in counts.iter_mut().zip(record.raw_labels()) {
                *count += usize::from(value);
            }
        }
        counts
    }
}

/// Split feature and label matrices into disjoint train/validation parts.
///
/// Row order is shuffled with a seeded generator before partitioning, so the
/// same seed always yields the same split. Both partitions are guaranteed
/// non-empty.
pub fn train_validation_split(
    features: &Array2<f64>,
    labels: &Array2<f64>,
    val_ratio: f64,
    seed: u64,
) -> Result<(Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>)> {
    let n = features.nrows();
    if labels.nrows() != n {
        return Err(Error::InvalidConfig {
            reason: format!(
                "feature rows ({}) and label rows ({}) differ",
                n,
                labels.nrows()
            ),
        });
    }
    if n < 2 {
        return Err(Error::DatasetTooSmall { rows: n });
    }
    if !(0.0..1.0).contains(&val_ratio) || val_ratio <= 0.0 {
        return Err(Error::InvalidConfig {
            reason: format!("validation ratio {val_ratio} must be in (0, 1)"),
        });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_val = ((n as f64 * val_ratio).round() as usize).clamp(1, n - 1);
    let (val_idx, train_idx) = indices.split_at(n_val);

    Ok((
        features.select(Axis(0), train_idx),
        labels.select(Axis(0), train_idx),
        features.select(Axis(0), val_idx),
        labels.select(Axis(0), val_idx),
    ))
}
