//! Portable inference graph
//!
//! Flattens a trained classifier into a linear list of primitive ops
//! (matrix multiply, affine rescale, ReLU, sigmoid) that any runtime can
//! replay without this crate's layer types. Batch normalization is folded
//! into a single affine op using the running statistics, and dropout
//! disappears entirely, so the graph reproduces evaluation-mode output.

use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::data::N_RISK_CATEGORIES;
use crate::error::{Error, Result};
use crate::nn::{relu, sigmoid, RiskClassifier};

/// One primitive operation of the flattened graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraphOp {
    /// Dense projection: y = x @ weights + bias.
    Gemm {
        weights: Array2<f64>,
        bias: Array1<f64>,
    },
    /// Per-feature affine map: y = x * scale + shift.
    Scale {
        scale: Array1<f64>,
        shift: Array1<f64>,
    },
    /// Element-wise max(0, x).
    Relu,
    /// Element-wise logistic sigmoid.
    Sigmoid,
}

/// Flattened, runtime-agnostic form of the trained classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceGraph {
    /// Name of the single graph input.
    pub input_name: String,
    /// Name of the single graph output.
    pub output_name: String,
    /// Expected feature width.
    pub input_dim: usize,
    /// Probability columns produced.
    pub output_dim: usize,
    /// Operations in execution order.
    pub ops: Vec<GraphOp>,
}

impl InferenceGraph {
    /// Replay the graph over a batch of feature rows.
    pub fn run(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        if input.ncols() != self.input_dim {
            return Err(Error::DimensionMismatch {
                expected: self.input_dim,
                actual: input.ncols(),
            });
        }

        let mut current = input.clone();
        for (index, op) in self.ops.iter().enumerate() {
            current = match op {
                GraphOp::Gemm { weights, bias } => {
                    if current.ncols() != weights.nrows() {
                        return Err(Error::ExportMismatch {
                            reason: format!(
                                "op {index} expects width {}, got {}",
                                weights.nrows(),
                                current.ncols()
                            ),
                        });
                    }
                    let mut z = current.dot(weights);
                    for mut row in z.rows_mut() {
                        row += bias;
                    }
                    z
                }
                GraphOp::Scale { scale, shift } => {
                    if current.ncols() != scale.len() {
                        return Err(Error::ExportMismatch {
                            reason: format!(
                                "op {index} expects width {}, got {}",
                                scale.len(),
                                current.ncols()
                            ),
                        });
                    }
                    &current * scale + shift
                }
                GraphOp::Relu => relu(&current),
                GraphOp::Sigmoid => sigmoid(&current),
            };
        }

        Ok(current)
    }

    /// Replay random feature rows through both the graph and the source
    /// model and require them to agree.
    ///
    /// Catches fusion mistakes and drift between the checkpoint and the
    /// exported artifact before either ships.
    pub fn verify_against(&self, model: &mut RiskClassifier, rows: usize) -> Result<()> {
        let input = Array2::random((rows, self.input_dim), Uniform::new(-1.0, 1.0));
        let from_graph = self.run(&input)?;
        let from_model = model.predict(&input)?;

        if from_graph.dim() != (rows, self.output_dim) {
            return Err(Error::ExportMismatch {
                reason: format!(
                    "output shape {:?}, expected ({rows}, {})",
                    from_graph.dim(),
                    self.output_dim
                ),
            });
        }
        for &p in from_graph.iter() {
            if !p.is_finite() || p <= 0.0 || p >= 1.0 {
                return Err(Error::ExportMismatch {
                    reason: format!("probability {p} outside the open unit interval"),
                });
            }
        }

        let max_diff = from_graph
            .iter()
            .zip(from_model.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        if max_diff > 1e-9 {
            return Err(Error::ExportMismatch {
                reason: format!("graph diverges from the model by {max_diff:e}"),
            });
        }

        info!(rows, max_diff, "export verified against the model");
        Ok(())
    }

    /// Save the graph as JSON, written durably via a temp file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Load a previously saved graph.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Flatten a trained classifier into an [`InferenceGraph`].
pub fn export_graph(model: &RiskClassifier) -> InferenceGraph {
    let mut ops = Vec::with_capacity(model.blocks.len() * 3 + 2);

    for block in &model.blocks {
        ops.push(GraphOp::Gemm {
            weights: block.linear.weights.clone(),
            bias: block.linear.biases.clone(),
        });

        // Fold the running statistics into one affine map:
        // scale = gamma / sqrt(var + eps), shift = beta - mean * scale
        let norm = &block.norm;
        let scale = &norm.weight / &norm.running_var.mapv(|v| (v + norm.eps).sqrt());
        let shift = &norm.bias - &(&norm.running_mean * &scale);
        ops.push(GraphOp::Scale { scale, shift });
        ops.push(GraphOp::Relu);
    }

    ops.push(GraphOp::Gemm {
        weights: model.output.weights.clone(),
        bias: model.output.biases.clone(),
    });
    ops.push(GraphOp::Sigmoid);

    InferenceGraph {
        input_name: "input".to_string(),
        output_name: "output".to_string(),
        input_dim: model.config.input_dim,
        output_dim: N_RISK_CATEGORIES,
        ops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::ClassifierConfig;

    fn trained_model() -> RiskClassifier {
        let config = ClassifierConfig::new(6).with_hidden_dims(vec![5, 4]);
        let mut model = RiskClassifier::new(config).unwrap();
        // A few training-mode passes move the running statistics off
        // their initial values, so the fusion is exercised for real
        let x = Array2::from_shape_fn((8, 6), |(i, j)| ((i + 2 * j) % 5) as f64 * 0.3 - 0.6);
        for _ in 0..5 {
            model.forward(&x, true);
        }
        model
    }

    #[test]
    fn test_export_structure() {
        let model = trained_model();
        let graph = export_graph(&model);

        assert_eq!(graph.input_dim, 6);
        assert_eq!(graph.output_dim, N_RISK_CATEGORIES);
        // Two blocks of gemm/scale/relu, then the output gemm and sigmoid
        assert_eq!(graph.ops.len(), 8);
        assert!(matches!(graph.ops[0], GraphOp::Gemm { .. }));
        assert!(matches!(graph.ops[1], GraphOp::Scale { .. }));
        assert!(matches!(graph.ops[7], GraphOp::Sigmoid));
    }

    #[test]
    fn test_graph_matches_model() {
        let mut model = trained_model();
        let graph = export_graph(&model);

        let input = Array2::from_shape_fn((4, 6), |(i, j)| (i as f64 - j as f64) * 0.25);
        let from_graph = graph.run(&input).unwrap();
        let from_model = model.predict(&input).unwrap();

        let max_diff = from_graph
            .iter()
            .zip(from_model.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(max_diff < 1e-9, "max divergence {max_diff}");
    }

    #[test]
    fn test_verify_against_accepts_own_model() {
        let mut model = trained_model();
        let graph = export_graph(&model);
        graph.verify_against(&mut model, 16).unwrap();
    }

    #[test]
    fn test_verify_against_detects_drift() {
        let mut model = trained_model();
        let graph = export_graph(&model);

        // Drift the model after export
        model.output.biases[0] += 1.0;
        let result = graph.verify_against(&mut model, 16);
        assert!(matches!(result, Err(Error::ExportMismatch { .. })));
    }

    #[test]
    fn test_run_rejects_wrong_width() {
        let model = trained_model();
        let graph = export_graph(&model);
        let input = Array2::ones((2, 9));
        assert!(matches!(
            graph.run(&input),
            Err(Error::DimensionMismatch {
                expected: 6,
                actual: 9
            })
        ));
    }

    #[test]
    fn test_malformed_graph_fails_without_panicking() {
        let graph = InferenceGraph {
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            input_dim: 6,
            output_dim: N_RISK_CATEGORIES,
            ops: vec![GraphOp::Gemm {
                weights: Array2::zeros((4, 3)),
                bias: Array1::zeros(3),
            }],
        };
        let input = Array2::ones((2, 6));
        assert!(matches!(
            graph.run(&input),
            Err(Error::ExportMismatch { .. })
        ));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let model = trained_model();
        let graph = export_graph(&model);
        graph.save(&path).unwrap();
        let restored = InferenceGraph::load(&path).unwrap();

        let input = Array2::from_shape_fn((3, 6), |(i, j)| (i * 6 + j) as f64 * 0.05);
        assert_eq!(
            graph.run(&input).unwrap(),
            restored.run(&input).unwrap()
        );
        assert_eq!(restored.input_name, "input");
        assert_eq!(restored.ops.len(), 8);
    }
}
