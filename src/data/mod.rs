//! Dataset Module
//!
//! Provides the labeled requirement corpus:
//! - Risk categories and the fixed label ordering
//! - Strict CSV loading with row validation
//! - Seeded train/validation splitting

mod dataset;
mod labels;

pub use dataset::{train_validation_split, RequirementDataset, RequirementRecord};
pub use labels::{RiskCategory, N_RISK_CATEGORIES};
