//! Feature composition
//!
//! Joins the semantic embedding of each requirement with its keyword
//! indicator block into the single matrix the classifier consumes.
//! Embedding columns come first, indicator columns after; row `i` always
//! corresponds to `texts[i]`.

use ndarray::{s, Array2};
use tracing::info;

use super::encoder::OnnxEncoder;
use super::indicators::IndicatorExtractor;
use super::tfidf::TfidfVectorizer;
use crate::error::{Error, Result};

/// Text-embedding strategy feeding the classifier.
///
/// Both variants produce one dense row per text; the classifier is
/// agnostic to which one built its input.
pub enum Embedder {
    /// Pretrained transformer encoder driven through ONNX Runtime.
    Transformer(OnnxEncoder),
    /// TF-IDF bag-of-words fitted on the training corpus.
    Lexical(TfidfVectorizer),
}

impl Embedder {
    /// Embedding width.
    pub fn dim(&self) -> Result<usize> {
        match self {
            Embedder::Transformer(encoder) => Ok(encoder.hidden_size()),
            Embedder::Lexical(vectorizer) => {
                if !vectorizer.is_fitted() {
                    return Err(Error::VectorizerNotFitted);
                }
                Ok(vectorizer.dim())
            }
        }
    }

    fn embed(&mut self, texts: &[String]) -> Result<Array2<f64>> {
        match self {
            Embedder::Transformer(encoder) => encoder.embed(texts),
            Embedder::Lexical(vectorizer) => vectorizer.transform(texts),
        }
    }
}

/// Builds classifier inputs from raw requirement texts.
pub struct FeatureComposer {
    embedder: Embedder,
    indicators: IndicatorExtractor,
}

impl FeatureComposer {
    pub fn new(embedder: Embedder) -> Self {
        Self {
            embedder,
            indicators: IndicatorExtractor::new(),
        }
    }

    /// Fit any trainable embedder state on the training corpus.
    ///
    /// The transformer strategy is already trained and passes through.
    pub fn fit(&mut self, texts: &[String]) -> Result<()> {
        if let Embedder::Lexical(vectorizer) = &mut self.embedder {
            vectorizer.fit(texts)?;
            info!(vocabulary = vectorizer.dim(), "fitted lexical vocabulary");
        }
        Ok(())
    }

    /// Total feature width: embedding dimension plus indicator columns.
    pub fn width(&self) -> Result<usize> {
        Ok(self.embedder.dim()? + self.indicators.width())
    }

    /// Compose the `(n_texts, width)` feature matrix.
    pub fn features(&mut self, texts: &[String]) -> Result<Array2<f64>> {
        let embeddings = self.embedder.embed(texts)?;
        let indicators = self.indicators.extract_batch(texts);
        let emb_dim = embeddings.ncols();

        let mut features = Array2::zeros((texts.len(), emb_dim + indicators.ncols()));
        features.slice_mut(s![.., ..emb_dim]).assign(&embeddings);
        features.slice_mut(s![.., emb_dim..]).assign(&indicators);
        Ok(features)
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn indicators(&self) -> &IndicatorExtractor {
        &self.indicators
    }
}
