//! Multi-label risk classifier
//!
//! Feedforward network mapping one feature row to six independent risk
//! probabilities. Hidden stages are Linear -> BatchNorm -> ReLU -> Dropout;
//! the output layer is a Linear projection squashed with a sigmoid.
//! Training minimizes binary cross-entropy averaged over every label cell.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use super::activation::sigmoid;
use super::layer::{HiddenBlock, Linear};
use super::optimizer::Optimizer;
use crate::data::N_RISK_CATEGORIES;
use crate::error::{Error, Result};

/// Network shape and regularization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Width of the feature rows
    pub input_dim: usize,
    /// Hidden block widths, outermost first
    pub hidden_dims: Vec<usize>,
    /// Dropout rate applied inside every hidden block
    pub dropout: f64,
}

impl ClassifierConfig {
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dims: vec![512, 256, 128],
            dropout: 0.3,
        }
    }

    pub fn with_hidden_dims(mut self, hidden_dims: Vec<usize>) -> Self {
        self.hidden_dims = hidden_dims;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout.clamp(0.0, 1.0);
        self
    }
}

/// Serialized model state.
#[derive(Serialize, Deserialize)]
struct Checkpoint {
    config: ClassifierConfig,
    blocks: Vec<HiddenBlock>,
    output: Linear,
    saved_at: DateTime<Utc>,
}

/// Feedforward multi-label classifier over requirement features.
pub struct RiskClassifier {
    pub blocks: Vec<HiddenBlock>,
    pub output: Linear,
    pub config: ClassifierConfig,
}

impl RiskClassifier {
    /// Build a freshly initialized network from the configuration.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        if config.input_dim == 0 {
            return Err(Error::InvalidConfig {
                reason: "input dimension must be positive".to_string(),
            });
        }
        if config.hidden_dims.iter().any(|&width| width == 0) {
            return Err(Error::InvalidConfig {
                reason: "hidden widths must be positive".to_string(),
            });
        }

        let mut blocks = Vec::with_capacity(config.hidden_dims.len());
        let mut input = config.input_dim;
        for &width in &config.hidden_dims {
            blocks.push(HiddenBlock::new(input, width, config.dropout));
            input = width;
        }
        let output = Linear::new(input, N_RISK_CATEGORIES);

        let model = Self {
            blocks,
            output,
            config,
        };
        debug!(parameters = model.num_parameters(), "initialized classifier");
        Ok(model)
    }

    /// Forward pass through the network.
    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        let mut output = input.clone();
        for block in &mut self.blocks {
            output = block.forward(&output, training);
        }
        let logits = self.output.forward(&output);
        sigmoid(&logits)
    }

    /// Predict probabilities for a batch of feature rows.
    ///
    /// Evaluation mode: dropout off, batch norm on running statistics.
    pub fn predict(&mut self, input: &Array2<f64>) -> Result<Array2<f64>> {
        if input.ncols() != self.config.input_dim {
            return Err(Error::DimensionMismatch {
                expected: self.config.input_dim,
                actual: input.ncols(),
            });
        }
        Ok(self.forward(input, false))
    }

    /// Binary cross-entropy averaged over every label cell of the batch.
    pub fn bce_loss(predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let n = predictions.len() as f64;
        let epsilon = 1e-15;
        let p = predictions.mapv(|v| v.clamp(epsilon, 1.0 - epsilon));
        let loss =
            targets * &p.mapv(f64::ln) + &(1.0 - targets) * &(1.0 - &p).mapv(f64::ln);
        -loss.sum() / n
    }

    /// Backward pass and weight update for one batch.
    ///
    /// The sigmoid and cross-entropy derivatives fold into (p - t) / n,
    /// so the gradient enters at the output logits.
    pub fn backward(
        &mut self,
        predictions: &Array2<f64>,
        targets: &Array2<f64>,
        optimizer: &mut dyn Optimizer,
    ) {
        let n = predictions.len() as f64;
        let delta = (predictions - targets) / n;

        optimizer.begin_step();

        let base = self.blocks.len() * 4;
        let (mut gradient, weight_grad, bias_grad) = self.output.backward(&delta);
        optimizer.update_matrix(base, &mut self.output.weights, &weight_grad);
        optimizer.update_vector(base + 1, &mut self.output.biases, &bias_grad);

        for (i, block) in self.blocks.iter_mut().enumerate().rev() {
            let (input_grad, grads) = block.backward(&gradient);
            let slot = i * 4;
            optimizer.update_matrix(slot, &mut block.linear.weights, &grads.weights);
            optimizer.update_vector(slot + 1, &mut block.linear.biases, &grads.biases);
            optimizer.update_vector(slot + 2, &mut block.norm.weight, &grads.gamma);
            optimizer.update_vector(slot + 3, &mut block.norm.bias, &grads.beta);
            gradient = input_grad;
        }
    }

    /// Get total number of parameters.
    pub fn num_parameters(&self) -> usize {
        self.blocks.iter().map(|b| b.num_parameters()).sum::<usize>()
            + self.output.num_parameters()
    }

    /// Human-readable architecture description.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("input dim: {}", self.config.input_dim)];

        let mut input = self.config.input_dim;
        for (i, block) in self.blocks.iter().enumerate() {
            lines.push(format!(
                "block {}: {} -> {} (linear, batchnorm, relu, dropout {:.2}), params: {}",
                i + 1,
                input,
                block.output_size(),
                block.dropout_rate,
                block.num_parameters()
            ));
            input = block.output_size();
        }
        lines.push(format!(
            "output: {} -> {} (linear, sigmoid), params: {}",
            input,
            self.output.output_size,
            self.output.num_parameters()
        ));
        lines.push(format!("total parameters: {}", self.num_parameters()));
        lines.join("\n")
    }

    /// Save model state to a checkpoint file.
    ///
    /// Writes a sibling temp file, syncs it, then renames into place so a
    /// crash mid-write cannot leave a truncated checkpoint behind.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let checkpoint = Checkpoint {
            config: self.config.clone(),
            blocks: self.blocks.clone(),
            output: self.output.clone(),
            saved_at: Utc::now(),
        };

        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &checkpoint)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Load model state from a checkpoint file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CheckpointMissing {
                    path: path.to_path_buf(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let reader = BufReader::new(file);
        let checkpoint: Checkpoint = serde_json::from_reader(reader)?;

        Ok(Self {
            blocks: checkpoint.blocks,
            output: checkpoint.output,
            config: checkpoint.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::optimizer::Adam;
    use ndarray::Array2;

    fn toy_batch() -> (Array2<f64>, Array2<f64>) {
        // Labels follow the sign of the first feature
        let n = 8;
        let x = Array2::from_shape_fn((n, 5), |(i, j)| {
            if j == 0 {
                if i % 2 == 0 {
                    1.0
                } else {
                    -1.0
                }
            } else {
                0.1 * (i + j) as f64
            }
        });
        let y = Array2::from_shape_fn((n, N_RISK_CATEGORIES), |(i, _)| {
            if i % 2 == 0 {
                1.0
            } else {
                0.0
            }
        });
        (x, y)
    }

    #[test]
    fn test_default_architecture() {
        let model = RiskClassifier::new(ClassifierConfig::new(518)).unwrap();
        assert_eq!(model.blocks.len(), 3);
        assert_eq!(model.blocks[0].linear.weights.dim(), (518, 512));
        assert_eq!(model.output.weights.dim(), (128, N_RISK_CATEGORIES));
    }

    #[test]
    fn test_rejects_zero_input_dim() {
        let result = RiskClassifier::new(ClassifierConfig::new(0));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_forward_shape_and_range() {
        let config = ClassifierConfig::new(10).with_hidden_dims(vec![8, 4]);
        let mut model = RiskClassifier::new(config).unwrap();
        let input = Array2::ones((4, 10));
        let probs = model.forward(&input, false);

        assert_eq!(probs.dim(), (4, N_RISK_CATEGORIES));
        for &p in probs.iter() {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let config = ClassifierConfig::new(10).with_hidden_dims(vec![8]);
        let mut model = RiskClassifier::new(config).unwrap();
        let input = Array2::ones((2, 7));

        match model.predict(&input) {
            Err(Error::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 7);
            }
            other => panic!("expected DimensionMismatch, got {:?}", other.map(|p| p.dim())),
        }
    }

    #[test]
    fn test_bce_loss_values() {
        let targets = Array2::from_shape_vec((1, 2), vec![1.0, 0.0]).unwrap();
        let perfect = Array2::from_shape_vec((1, 2), vec![1.0, 0.0]).unwrap();
        assert!(RiskClassifier::bce_loss(&perfect, &targets) < 1e-10);

        let uncertain = Array2::from_elem((1, 2), 0.5);
        let loss = RiskClassifier::bce_loss(&uncertain, &targets);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn test_training_step_reduces_loss() {
        let config = ClassifierConfig::new(5)
            .with_hidden_dims(vec![8])
            .with_dropout(0.0);
        let mut model = RiskClassifier::new(config).unwrap();
        let mut optimizer = Adam::new(0.01);
        let (x, y) = toy_batch();

        let initial = RiskClassifier::bce_loss(&model.forward(&x, false), &y);
        for _ in 0..200 {
            let predictions = model.forward(&x, true);
            model.backward(&predictions, &y, &mut optimizer);
        }
        let trained = RiskClassifier::bce_loss(&model.forward(&x, false), &y);

        assert!(trained < initial);
    }

    #[test]
    fn test_num_parameters() {
        let config = ClassifierConfig::new(10).with_hidden_dims(vec![4]);
        let model = RiskClassifier::new(config).unwrap();
        // block: 10*4 + 4 weights/biases, gamma/beta of width 4
        // output: 4*6 + 6
        assert_eq!(model.num_parameters(), 44 + 8 + 30);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let config = ClassifierConfig::new(6).with_hidden_dims(vec![5, 3]);
        let mut model = RiskClassifier::new(config).unwrap();
        let input = Array2::from_shape_fn((3, 6), |(i, j)| (i * 6 + j) as f64 * 0.1);

        model.save(&path).unwrap();
        let mut restored = RiskClassifier::load(&path).unwrap();

        let original = model.predict(&input).unwrap();
        let reloaded = restored.predict(&input).unwrap();
        assert_eq!(original, reloaded);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let result = RiskClassifier::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(Error::CheckpointMissing { .. })));
    }

    #[test]
    fn test_summary_reports_totals() {
        let config = ClassifierConfig::new(10).with_hidden_dims(vec![4]);
        let model = RiskClassifier::new(config).unwrap();
        let summary = model.summary();
        assert!(summary.contains("total parameters: 82"));
        assert!(summary.contains("block 1: 10 -> 4"));
    }
}
