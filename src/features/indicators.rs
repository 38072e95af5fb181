//! Technical-indicator extraction from requirement text
//!
//! Deterministic keyword and length features. No learned state, no
//! randomness: the same text always produces the same row, and the category
//! order is fixed because downstream feature indices depend on it.

use ndarray::Array2;

/// Keyword table, one entry per technical category.
///
/// Order is part of the feature contract; changing it invalidates any
/// trained model.
const KEYWORD_TABLE: [(&str, &[&str]); 7] = [
    ("api", &["api", "endpoint", "rest", "graphql", "soap", "route"]),
    (
        "database",
        &[
            "db", "database", "sql", "nosql", "mongodb", "postgres", "mysql", "store", "query",
        ],
    ),
    (
        "auth",
        &[
            "login",
            "user",
            "password",
            "auth",
            "credential",
            "token",
            "jwt",
            "session",
            "sign in",
            "signup",
        ],
    ),
    (
        "payment",
        &[
            "credit",
            "card",
            "payment",
            "stripe",
            "paypal",
            "money",
            "transaction",
            "transfer",
            "billing",
        ],
    ),
    (
        "file",
        &[
            "upload", "file", "image", "picture", "document", "pdf", "csv", "download",
        ],
    ),
    (
        "admin",
        &["admin", "dashboard", "settings", "config", "manage", "delete", "edit"],
    ),
    (
        "data",
        &[
            "data",
            "analytics",
            "report",
            "stats",
            "profile",
            "email",
            "phone",
            "address",
        ],
    ),
];

/// Number of scalar features appended after the per-category pairs.
const N_SCALAR_FEATURES: usize = 4;

/// Stateless extractor of keyword/length indicator features.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorExtractor;

impl IndicatorExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Width of every indicator row: (count, presence) per category plus
    /// four scalars.
    pub fn width(&self) -> usize {
        KEYWORD_TABLE.len() * 2 + N_SCALAR_FEATURES
    }

    /// Extract one indicator row from a single text.
    ///
    /// An empty text yields an all-zero row; it is not rejected here.
    pub fn extract(&self, text: &str) -> Vec<f64> {
        let lower = text.to_lowercase();
        let mut row = Vec::with_capacity(self.width());

        for (_, keywords) in KEYWORD_TABLE {
            let count = keywords.iter().filter(|kw| lower.contains(*kw)).count() as f64;
            row.push(count);
            row.push(if count > 0.0 { 1.0 } else { 0.0 });
        }

        row.push(text.len() as f64 / 1000.0);
        row.push(text.split_whitespace().count() as f64 / 100.0);
        row.push(if lower.contains("http") { 1.0 } else { 0.0 });
        row.push(if text.chars().any(|c| c.is_ascii_digit()) {
            1.0
        } else {
            0.0
        });

        row
    }

    /// Extract a `(n_texts, width)` matrix, row order preserved.
    pub fn extract_batch(&self, texts: &[String]) -> Array2<f64> {
        let width = self.width();
        let mut matrix = Array2::zeros((texts.len(), width));
        for (i, text) in texts.iter().enumerate() {
            for (j, value) in self.extract(text).into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        matrix
    }

    /// Names of the indicator columns, in output order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        for (category, _) in KEYWORD_TABLE {
            names.push(format!("{category}_count"));
            names.push(format!("{category}_present"));
        }
        names.push("text_length".to_string());
        names.push("word_count".to_string());
        names.push("has_url".to_string());
        names.push("has_number".to_string());
        names
    }

    /// Index of a category's presence flag within a row.
    pub fn presence_index(&self, category: &str) -> Option<usize> {
        KEYWORD_TABLE
            .iter()
            .position(|(name, _)| *name == category)
            .map(|i| i * 2 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_matches_names() {
        let extractor = IndicatorExtractor::new();
        assert_eq!(extractor.width(), 18);
        assert_eq!(extractor.feature_names().len(), 18);
    }

    #[test]
    fn test_deterministic() {
        let extractor = IndicatorExtractor::new();
        let text = "Upload a PDF document to the REST API";
        assert_eq!(extractor.extract(text), extractor.extract(text));
    }

    #[test]
    fn test_api_and_payment_flags() {
        let extractor = IndicatorExtractor::new();
        let api_flag = extractor.presence_index("api").unwrap();
        let payment_flag = extractor.presence_index("payment").unwrap();

        let row = extractor.extract("Create an API to transfer funds.");
        assert_eq!(row[api_flag], 1.0);
        assert_eq!(row[payment_flag], 1.0);
    }

    #[test]
    fn test_benign_text_has_no_presence_flags() {
        let extractor = IndicatorExtractor::new();
        let row = extractor.extract("Update the logo color.");
        for (category, _) in KEYWORD_TABLE {
            let flag = extractor.presence_index(category).unwrap();
            assert_eq!(row[flag], 0.0, "unexpected hit for {category}");
        }
    }

    #[test]
    fn test_count_is_distinct_keywords_not_occurrences() {
        let extractor = IndicatorExtractor::new();
        // "api" appears twice but counts once; "endpoint" adds one more.
        let row = extractor.extract("api api endpoint");
        assert_eq!(row[0], 2.0);
        assert_eq!(row[1], 1.0);
    }

    #[test]
    fn test_scalar_features() {
        let extractor = IndicatorExtractor::new();
        let row = extractor.extract("Serve 3 pages over http");
        let width = extractor.width();
        assert_eq!(row[width - 2], 1.0); // http flag
        assert_eq!(row[width - 1], 1.0); // digit flag
        assert!(row[width - 4] > 0.0); // text length
        assert!((row[width - 3] - 0.05).abs() < 1e-12); // 5 words / 100
    }

    #[test]
    fn test_empty_text_is_all_zero() {
        let extractor = IndicatorExtractor::new();
        let row = extractor.extract("");
        assert!(row.iter().all(|v| *v == 0.0));
        assert_eq!(row.len(), extractor.width());
    }

    #[test]
    fn test_batch_shape_and_order() {
        let extractor = IndicatorExtractor::new();
        let texts = vec![
            "Run a query against the database".to_string(),
            "Change the logo color".to_string(),
        ];
        let matrix = extractor.extract_batch(&texts);
        assert_eq!(matrix.dim(), (2, extractor.width()));

        let db_flag = extractor.presence_index("database").unwrap();
        assert_eq!(matrix[[0, db_flag]], 1.0);
        assert_eq!(matrix[[1, db_flag]], 0.0);
    }
}
