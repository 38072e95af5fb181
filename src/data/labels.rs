//! Risk categories and the fixed label ordering
//!
//! Every label vector in the pipeline follows the order of
//! [`RiskCategory::ALL`]; metrics, checkpoints, and exported artifacts all
//! rely on that ordering staying put.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of independent risk labels the classifier predicts.
pub const N_RISK_CATEGORIES: usize = 6;

/// One security-risk category a requirement may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    /// No authentication requirement stated.
    Authentication,
    /// No authorization / access-control requirement stated.
    Authorization,
    /// No encryption requirement stated.
    Encryption,
    /// No input-validation requirement stated.
    Validation,
    /// No audit-logging requirement stated.
    Audit,
    /// No rate-limiting requirement stated.
    RateLimit,
}

impl RiskCategory {
    /// All categories in label-vector order.
    pub const ALL: [RiskCategory; N_RISK_CATEGORIES] = [
        RiskCategory::Authentication,
        RiskCategory::Authorization,
        RiskCategory::Encryption,
        RiskCategory::Validation,
        RiskCategory::Audit,
        RiskCategory::RateLimit,
    ];

    /// Position of this category inside a label vector.
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|c| c == self)
            .unwrap_or_default()
    }

    /// Dataset column name carrying this label.
    pub fn column(&self) -> &'static str {
        match self {
            RiskCategory::Authentication => "missing_auth",
            RiskCategory::Authorization => "missing_authz",
            RiskCategory::Encryption => "missing_encryption",
            RiskCategory::Validation => "missing_validation",
            RiskCategory::Audit => "missing_audit",
            RiskCategory::RateLimit => "missing_ratelimit",
        }
    }

    /// Short name used in per-class report tables.
    pub fn short_name(&self) -> &'static str {
        match self {
            RiskCategory::Authentication => "Auth",
            RiskCategory::Authorization => "Authz",
            RiskCategory::Encryption => "Encrypt",
            RiskCategory::Validation => "Valid",
            RiskCategory::Audit => "Audit",
            RiskCategory::RateLimit => "RateLim",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order() {
        let columns: Vec<&str> = RiskCategory::ALL.iter().map(|c| c.column()).collect();
        assert_eq!(
            columns,
            vec![
                "missing_auth",
                "missing_authz",
                "missing_encryption",
                "missing_validation",
                "missing_audit",
                "missing_ratelimit",
            ]
        );
    }

    #[test]
    fn test_index_round_trip() {
        for (i, category) in RiskCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }
}
