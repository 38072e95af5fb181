//! Feature extraction for requirement texts
//!
//! Two embedding strategies produce the semantic block of each feature
//! row: a pretrained transformer encoder served through ONNX Runtime, or
//! a TF-IDF vectorizer fitted on the training corpus. Either block is
//! joined with deterministic keyword indicators by [`FeatureComposer`].

mod composer;
mod encoder;
mod indicators;
mod tfidf;
mod tokenize;
mod wordpiece;

pub use composer::{Embedder, FeatureComposer};
pub use encoder::{EncoderConfig, OnnxEncoder};
pub use indicators::IndicatorExtractor;
pub use tfidf::{TfidfVectorizer, DEFAULT_MAX_FEATURES};
pub use tokenize::{english_stop_words, tokenize};
pub use wordpiece::WordPieceTokenizer;
