//! Crate-wide error type
//!
//! Every fallible library operation returns [`Result`]. Binaries convert
//! these into `anyhow` errors at the boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the secreq pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// A label column held something other than 0 or 1.
    #[error("dataset row {row}: column `{column}` must be 0 or 1, got {value}")]
    InvalidLabel {
        row: usize,
        column: &'static str,
        value: u8,
    },

    /// A row was missing its requirement text.
    #[error("dataset row {row}: requirement text must not be empty")]
    EmptyText { row: usize },

    /// Two rows shared the same id.
    #[error("dataset row {row}: duplicate id {id}")]
    DuplicateId { row: usize, id: u64 },

    /// The dataset parsed but contained no rows.
    #[error("dataset `{}` contains no rows", .path.display())]
    EmptyDataset { path: PathBuf },

    /// Too few rows to form non-empty train and validation partitions.
    #[error("dataset has {rows} rows; need at least 2 to split into train and validation")]
    DatasetTooSmall { rows: usize },

    /// A file the semantic encoder needs does not exist.
    #[error("encoder resource not found: `{}`", .path.display())]
    EncoderResource { path: PathBuf },

    /// The tokenizer vocabulary lacks a required special token.
    #[error("tokenizer vocabulary is missing the `{token}` token")]
    MissingSpecialToken { token: &'static str },

    /// The encoder emitted vectors of an unexpected width.
    #[error("encoder produced width {actual}, configured hidden size is {expected}")]
    EncoderWidth { expected: usize, actual: usize },

    /// ONNX Runtime failure, flattened to its message.
    #[error("onnx runtime failure: {0}")]
    Onnx(String),

    /// The TF-IDF vectorizer was asked to transform before being fitted.
    #[error("vectorizer used before fit; call fit on a corpus first")]
    VectorizerNotFitted,

    /// Fitting the vectorizer yielded no usable terms.
    #[error("vectorizer fit produced an empty vocabulary")]
    EmptyVocabulary,

    /// Feature width does not match the model's declared input width.
    #[error("feature width {actual} does not match model input dimensionality {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A model or trainer configuration that cannot be constructed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Evaluation or export requested before any checkpoint was written.
    #[error("checkpoint not found at `{}`; train a model first", .path.display())]
    CheckpointMissing { path: PathBuf },

    /// The exported inference graph failed its verification run.
    #[error("exported graph failed verification: {reason}")]
    ExportMismatch { reason: String },

    /// Training loss left the finite range; the run is invalid output.
    #[error("non-finite training loss at epoch {epoch}; the run is invalid")]
    NonFiniteLoss { epoch: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
