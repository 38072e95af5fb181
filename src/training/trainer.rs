//! Training loop
//!
//! Mini-batch gradient descent with a validation pass after every epoch.
//! The best model by validation loss is checkpointed as soon as it is
//! seen, so the artifact on disk never trails the in-memory best even if
//! the run is interrupted.

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use super::stopper::{EarlyStopping, StopState};
use crate::data::N_RISK_CATEGORIES;
use crate::error::{Error, Result};
use crate::nn::{Optimizer, RiskClassifier};

/// Training run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Upper bound on epochs; early stopping may end the run sooner.
    pub epochs: usize,
    /// Rows per gradient step.
    pub batch_size: usize,
    /// Optimizer step size.
    pub learning_rate: f64,
    /// Consecutive non-improving epochs tolerated before stopping.
    pub patience: usize,
    /// Where the best checkpoint is written.
    pub checkpoint_path: PathBuf,
    /// Decision cutoff used when reporting metrics.
    pub threshold: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-4,
            patience: 10,
            checkpoint_path: PathBuf::from("models/classifier.json"),
            threshold: 0.5,
        }
    }
}

/// Losses and validation F1 of one completed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_f1: f64,
}

/// Outcome of a whole training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    pub history: Vec<EpochRecord>,
    pub best_val_loss: f64,
    pub best_epoch: usize,
    pub early_stopped: bool,
    pub epochs_completed: usize,
}

/// Mini-batch trainer with early stopping and best-loss checkpointing.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        if config.epochs == 0 {
            return Err(Error::InvalidConfig {
                reason: "epoch budget must be positive".to_string(),
            });
        }
        if config.batch_size == 0 {
            return Err(Error::InvalidConfig {
                reason: "batch size must be positive".to_string(),
            });
        }
        if !(config.threshold > 0.0 && config.threshold < 1.0) {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "decision threshold must lie strictly between 0 and 1, got {}",
                    config.threshold
                ),
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Run the full training loop.
    ///
    /// Batches are reshuffled every epoch; the validation pass always runs
    /// in evaluation mode over the whole validation partition. Stops early
    /// once validation loss has stalled for `patience` consecutive epochs,
    /// checking the patience budget before the epoch cap.
    pub fn train(
        &self,
        model: &mut RiskClassifier,
        optimizer: &mut dyn Optimizer,
        x_train: &Array2<f64>,
        y_train: &Array2<f64>,
        x_val: &Array2<f64>,
        y_val: &Array2<f64>,
    ) -> Result<TrainingResult> {
        self.check_shapes(model, x_train, y_train, x_val, y_val)?;

        info!(
            train_rows = x_train.nrows(),
            val_rows = x_val.nrows(),
            features = x_train.ncols(),
            epochs = self.config.epochs,
            "training started"
        );

        let mut stopper = EarlyStopping::new(self.config.patience);
        let mut history = Vec::new();
        let mut early_stopped = false;

        for epoch in 1..=self.config.epochs {
            let train_loss = self.run_epoch(model, optimizer, x_train, y_train);
            if !train_loss.is_finite() {
                return Err(Error::NonFiniteLoss { epoch });
            }

            let val_predictions = model.forward(x_val, false);
            let val_loss = RiskClassifier::bce_loss(&val_predictions, y_val);
            if !val_loss.is_finite() {
                return Err(Error::NonFiniteLoss { epoch });
            }
            let val_f1 = super::metrics::evaluate(&val_predictions, y_val, self.config.threshold).f1;

            history.push(EpochRecord {
                epoch,
                train_loss,
                val_loss,
                val_f1,
            });

            match stopper.observe(epoch, val_loss) {
                StopState::Improved => {
                    model.save(&self.config.checkpoint_path)?;
                    info!(epoch, train_loss, val_loss, val_f1, "epoch complete, checkpoint updated");
                }
                StopState::Training | StopState::Stalled => {
                    info!(epoch, train_loss, val_loss, val_f1, "epoch complete");
                }
                StopState::Stopped => {
                    info!(epoch, train_loss, val_loss, val_f1, "epoch complete");
                    info!(
                        best_epoch = stopper.best_epoch(),
                        patience = self.config.patience,
                        "validation loss stalled, stopping early"
                    );
                    early_stopped = true;
                    break;
                }
            }
        }

        Ok(TrainingResult {
            best_val_loss: stopper.best_loss(),
            best_epoch: stopper.best_epoch(),
            early_stopped,
            epochs_completed: history.len(),
            history,
        })
    }

    fn check_shapes(
        &self,
        model: &RiskClassifier,
        x_train: &Array2<f64>,
        y_train: &Array2<f64>,
        x_val: &Array2<f64>,
        y_val: &Array2<f64>,
    ) -> Result<()> {
        for x in [x_train, x_val] {
            if x.ncols() != model.config.input_dim {
                return Err(Error::DimensionMismatch {
                    expected: model.config.input_dim,
                    actual: x.ncols(),
                });
            }
        }
        for y in [y_train, y_val] {
            if y.ncols() != N_RISK_CATEGORIES {
                return Err(Error::InvalidConfig {
                    reason: format!(
                        "label matrix is {} wide, expected {} risk categories",
                        y.ncols(),
                        N_RISK_CATEGORIES
                    ),
                });
            }
        }
        if x_train.nrows() != y_train.nrows() || x_val.nrows() != y_val.nrows() {
            return Err(Error::InvalidConfig {
                reason: "feature and label row counts differ".to_string(),
            });
        }
        if x_train.nrows() == 0 || x_val.nrows() == 0 {
            return Err(Error::DatasetTooSmall {
                rows: x_train.nrows().min(x_val.nrows()),
            });
        }
        Ok(())
    }

    /// One pass over the training partition in shuffled mini-batches.
    /// Returns the mean of the per-batch losses.
    fn run_epoch(
        &self,
        model: &mut RiskClassifier,
        optimizer: &mut dyn Optimizer,
        x: &Array2<f64>,
        y: &Array2<f64>,
    ) -> f64 {
        let n_samples = x.nrows();
        let batch_size = self.config.batch_size;
        let n_batches = (n_samples + batch_size - 1) / batch_size;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(&mut rand::thread_rng());

        let mut total_loss = 0.0;
        for batch_idx in 0..n_batches {
            let start = batch_idx * batch_size;
            let end = (start + batch_size).min(n_samples);
            let batch_indices = &indices[start..end];

            let x_batch = x.select(Axis(0), batch_indices);
            let y_batch = y.select(Axis(0), batch_indices);

            let predictions = model.forward(&x_batch, true);
            total_loss += RiskClassifier::bce_loss(&predictions, &y_batch);
            model.backward(&predictions, &y_batch, optimizer);
        }

        total_loss / n_batches as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Adam, ClassifierConfig};
    use std::path::Path;

    fn toy_data(n: usize, dim: usize) -> (Array2<f64>, Array2<f64>) {
        let x = Array2::from_shape_fn((n, dim), |(i, j)| ((i * dim + j) % 7) as f64 * 0.2 - 0.6);
        let y = Array2::from_shape_fn((n, N_RISK_CATEGORIES), |(i, k)| ((i + k) % 2) as f64);
        (x, y)
    }

    fn test_config(dir: &Path, epochs: usize, patience: usize) -> TrainerConfig {
        TrainerConfig {
            epochs,
            batch_size: 4,
            learning_rate: 1e-3,
            patience,
            checkpoint_path: dir.join("classifier.json"),
            threshold: 0.5,
        }
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let config = TrainerConfig {
            batch_size: 0,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            Trainer::new(config),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let config = TrainerConfig {
            threshold: 1.0,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            Trainer::new(config),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_history_covers_every_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Trainer::new(test_config(dir.path(), 3, 100)).unwrap();
        let mut model = RiskClassifier::new(
            ClassifierConfig::new(6)
                .with_hidden_dims(vec![5])
                .with_dropout(0.0),
        )
        .unwrap();
        let mut optimizer = Adam::new(1e-3);

        let (x, y) = toy_data(8, 6);
        let (xv, yv) = toy_data(4, 6);
        let result = trainer
            .train(&mut model, &mut optimizer, &x, &y, &xv, &yv)
            .unwrap();

        assert_eq!(result.epochs_completed, 3);
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.history[2].epoch, 3);
        assert!(result
            .history
            .iter()
            .all(|record| (0.0..=1.0).contains(&record.val_f1)));
        assert!(!result.early_stopped);
        assert!(result.best_epoch >= 1);
    }

    #[test]
    fn test_checkpoint_written_and_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 2, 100);
        let checkpoint_path = config.checkpoint_path.clone();
        let trainer = Trainer::new(config).unwrap();
        let mut model = RiskClassifier::new(
            ClassifierConfig::new(6)
                .with_hidden_dims(vec![5])
                .with_dropout(0.0),
        )
        .unwrap();
        let mut optimizer = Adam::new(1e-3);

        let (x, y) = toy_data(8, 6);
        let (xv, yv) = toy_data(4, 6);
        trainer
            .train(&mut model, &mut optimizer, &x, &y, &xv, &yv)
            .unwrap();

        // First epoch always improves on infinity, so the file must exist
        let restored = RiskClassifier::load(&checkpoint_path).unwrap();
        assert_eq!(restored.config.input_dim, 6);
    }

    #[test]
    fn test_rejects_wrong_feature_width() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Trainer::new(test_config(dir.path(), 2, 100)).unwrap();
        let mut model =
            RiskClassifier::new(ClassifierConfig::new(6).with_hidden_dims(vec![5])).unwrap();
        let mut optimizer = Adam::new(1e-3);

        let (x, y) = toy_data(8, 5);
        let (xv, yv) = toy_data(4, 5);
        let result = trainer.train(&mut model, &mut optimizer, &x, &y, &xv, &yv);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_non_finite_loss_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 5, 100);
        let checkpoint_path = config.checkpoint_path.clone();
        let trainer = Trainer::new(config).unwrap();
        let mut model = RiskClassifier::new(
            ClassifierConfig::new(4)
                .with_hidden_dims(vec![3])
                .with_dropout(0.0),
        )
        .unwrap();
        // A poisoned parameter makes the summed batch loss NaN from the
        // very first epoch
        model.output.biases[0] = f64::NAN;
        let mut optimizer = Adam::new(1e-3);

        let (x, y) = toy_data(8, 4);
        let (xv, yv) = toy_data(4, 4);

        let result = trainer.train(&mut model, &mut optimizer, &x, &y, &xv, &yv);
        assert!(matches!(result, Err(Error::NonFiniteLoss { epoch: 1 })));
        // No improvement was ever observed, so nothing was checkpointed
        assert!(!checkpoint_path.exists());
    }

    #[test]
    fn test_early_stopping_on_frozen_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), 50, 1);
        config.learning_rate = 0.0;
        let trainer = Trainer::new(config).unwrap();

        // No hidden blocks and a zero learning rate: the validation loss
        // repeats exactly, so the second epoch must stop the run.
        let mut model =
            RiskClassifier::new(ClassifierConfig::new(4).with_hidden_dims(vec![])).unwrap();
        let mut optimizer = Adam::new(0.0);

        let (x, y) = toy_data(8, 4);
        let (xv, yv) = toy_data(4, 4);
        let result = trainer
            .train(&mut model, &mut optimizer, &x, &y, &xv, &yv)
            .unwrap();

        assert!(result.early_stopped);
        assert_eq!(result.epochs_completed, 2);
        assert_eq!(result.best_epoch, 1);
    }

    #[test]
    fn test_best_loss_matches_history() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Trainer::new(test_config(dir.path(), 4, 100)).unwrap();
        let mut model = RiskClassifier::new(
            ClassifierConfig::new(6)
                .with_hidden_dims(vec![5])
                .with_dropout(0.0),
        )
        .unwrap();
        let mut optimizer = Adam::new(1e-3);

        let (x, y) = toy_data(12, 6);
        let (xv, yv) = toy_data(4, 6);
        let result = trainer
            .train(&mut model, &mut optimizer, &x, &y, &xv, &yv)
            .unwrap();

        let min_val = result
            .history
            .iter()
            .map(|r| r.val_loss)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_val_loss, min_val);
        assert_eq!(
            result.history[result.best_epoch - 1].val_loss,
            result.best_val_loss
        );
    }
}
