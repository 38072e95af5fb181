//! Sparse-lexical text embedding (TF-IDF)
//!
//! Fallback embedder used when no pretrained encoder is configured. The
//! vocabulary is fitted once on a corpus and reused for every subsequent
//! transform; refitting on a different corpus changes feature semantics and
//! invalidates any model trained on the old vocabulary, so the fitted state
//! is explicit and transform-before-fit fails fast.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::tokenize::{english_stop_words, tokenize};
use crate::error::{Error, Result};

/// Default vocabulary cap.
pub const DEFAULT_MAX_FEATURES: usize = 500;

/// Term-frequency / inverse-document-frequency vectorizer.
///
/// Vocabulary selection keeps the `max_features` terms with the highest
/// total corpus frequency (ties broken alphabetically); term indices are
/// assigned in alphabetical order. IDF uses the smoothed form
/// `ln((1 + n) / (1 + df)) + 1` and rows are L2-normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    max_features: usize,
    vocabulary: HashMap<String, usize>,
    terms: Vec<String>,
    idf: Vec<f64>,
    fitted: bool,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            vocabulary: HashMap::new(),
            terms: Vec::new(),
            idf: Vec::new(),
            fitted: false,
        }
    }

    /// Cap the vocabulary at `max_features` terms.
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    /// Tokens of one text with stop words removed.
    fn content_tokens(text: &str) -> Vec<String> {
        let stops = english_stop_words();
        tokenize(text)
            .into_iter()
            .filter(|t| !stops.contains(t.as_str()))
            .collect()
    }

    /// Build the vocabulary and IDF table from a corpus.
    pub fn fit(&mut self, texts: &[String]) -> Result<()> {
        let n_docs = texts.len();
        let mut corpus_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let tokens = Self::content_tokens(text);
            let mut seen = std::collections::HashSet::new();
            for token in &tokens {
                *corpus_freq.entry(token.clone()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        if corpus_freq.is_empty() {
            return Err(Error::EmptyVocabulary);
        }

        // Keep the most frequent terms; alphabetical order breaks ties and
        // assigns the final indices.
        let mut ranked: Vec<(String, usize)> = corpus_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort();

        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();

        self.idf = terms
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs as f64) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        self.terms = terms;
        self.fitted = true;
        Ok(())
    }

    /// Transform texts into a `(n_texts, dim)` TF-IDF matrix.
    pub fn transform(&self, texts: &[String]) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(Error::VectorizerNotFitted);
        }

        let dim = self.terms.len();
        let mut matrix = Array2::zeros((texts.len(), dim));

        for (i, text) in texts.iter().enumerate() {
            for token in Self::content_tokens(text) {
                if let Some(&idx) = self.vocabulary.get(&token) {
                    matrix[[i, idx]] += 1.0;
                }
            }

            let mut row = matrix.row_mut(i);
            for (value, idf) in row.iter_mut().zip(&self.idf) {
                *value *= idf;
            }

            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }

        Ok(matrix)
    }

    /// Fit on a corpus, then transform it.
    pub fn fit_transform(&mut self, texts: &[String]) -> Result<Array2<f64>> {
        self.fit(texts)?;
        self.transform(texts)
    }

    /// Width of transformed rows. Zero until fitted.
    pub fn dim(&self) -> usize {
        self.terms.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Fitted vocabulary, term to column index.
    pub fn vocabulary(&self) -> &HashMap<String, usize> {
        &self.vocabulary
    }

    /// Persist the fitted state so later runs transform identically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let vectorizer = serde_json::from_reader(reader)?;
        Ok(vectorizer)
    }
}
