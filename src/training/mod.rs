//! Model training and evaluation
//!
//! The trainer runs shuffled mini-batches with a validation pass per
//! epoch, checkpoints every new best validation loss, and stops early
//! when the loss stalls. Metrics cover macro precision/recall/F1,
//! per-category F1, and exact-match accuracy.

mod metrics;
mod stopper;
mod trainer;

pub use metrics::{evaluate, EvalMetrics};
pub use stopper::{EarlyStopping, StopState};
pub use trainer::{EpochRecord, Trainer, TrainerConfig, TrainingResult};
