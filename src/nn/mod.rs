//! Neural network module
//!
//! Building blocks of the risk classifier:
//! - Activation functions (ReLU, sigmoid)
//! - Linear, batch-norm, and composite hidden-block layers with forward
//!   and backward propagation
//! - Slot-addressed optimizers (SGD, Adam)
//! - The multi-label classifier with checkpointing

mod activation;
mod layer;
mod model;
mod optimizer;

pub use activation::{relu, relu_mask, sigmoid};
pub use layer::{BatchNorm1d, HiddenBlock, HiddenBlockGrads, Linear};
pub use model::{ClassifierConfig, RiskClassifier};
pub use optimizer::{Adam, Optimizer, Sgd};
