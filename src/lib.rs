//! # Security Requirement Risk Classifier
//!
//! This library trains and serves a multi-label classifier that flags
//! natural-language software requirements for missing security controls:
//! authentication, authorization, encryption, input validation, audit
//! logging, and rate limiting.
//!
//! ## Modules
//!
//! - `data` - Dataset loading, label schema, and train/validation splits
//! - `features` - Semantic embeddings (ONNX encoder or TF-IDF) plus
//!   keyword indicators
//! - `nn` - Feedforward network, optimizers, and checkpointing
//! - `training` - Mini-batch training loop, early stopping, and metrics
//! - `export` - Flattened inference graph for external runtimes
//! - `error` - The crate-wide error type

pub mod data;
pub mod error;
pub mod export;
pub mod features;
pub mod nn;
pub mod training;

pub use data::{RequirementDataset, RiskCategory};
pub use error::{Error, Result};
pub use features::FeatureComposer;
pub use nn::RiskClassifier;
pub use training::Trainer;

/// Crate version, surfaced in logs and artifacts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
