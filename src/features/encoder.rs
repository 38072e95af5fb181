//! Pretrained text encoder driven through ONNX Runtime
//!
//! Loads an exported transformer encoder (RoBERTa-style: `input_ids` +
//! `attention_mask` in, last hidden state out) and embeds requirement texts
//! as the first-position hidden state. Texts are processed in fixed-size
//! batches purely for throughput; results do not depend on the batch size.

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use super::wordpiece::WordPieceTokenizer;
use crate::error::{Error, Result};

/// Configuration for the ONNX encoder strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Exported encoder graph.
    pub model_path: PathBuf,
    /// WordPiece vocabulary matching the exported encoder.
    pub vocab_path: PathBuf,
    /// Texts per forward pass.
    pub batch_size: usize,
    /// Token positions per text (truncate/pad target).
    pub max_tokens: usize,
    /// Width of the encoder's hidden state.
    pub hidden_size: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/encoder.onnx"),
            vocab_path: PathBuf::from("models/vocab.txt"),
            batch_size: 16,
            max_tokens: 512,
            hidden_size: 768,
        }
    }
}

/// Semantic embedder backed by a pretrained ONNX encoder.
pub struct OnnxEncoder {
    session: Session,
    tokenizer: WordPieceTokenizer,
    config: EncoderConfig,
}

impl OnnxEncoder {
    /// Load the tokenizer vocabulary and build the runtime session.
    ///
    /// Both backing resources are checked up front; a missing file fails
    /// here, before any extraction is attempted.
    pub fn load(config: EncoderConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(Error::EncoderResource {
                path: config.model_path.clone(),
            });
        }
        let tokenizer = WordPieceTokenizer::from_vocab_file(&config.vocab_path, config.max_tokens)?;

        let session = Session::builder()
            .map_err(|e| Error::Onnx(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::Onnx(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e| Error::Onnx(e.to_string()))?;

        info!(
            model = %config.model_path.display(),
            vocab_size = tokenizer.vocab_size(),
            hidden_size = config.hidden_size,
            "loaded onnx encoder"
        );

        Ok(Self {
            session,
            tokenizer,
            config,
        })
    }

    /// Embedding width.
    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    /// Embed texts as `(n_texts, hidden_size)`, first-position hidden state
    /// per text, row order preserved.
    pub fn embed(&mut self, texts: &[String]) -> Result<Array2<f64>> {
        let hidden = self.config.hidden_size;
        let mut embeddings = Array2::zeros((texts.len(), hidden));

        for (chunk_idx, chunk) in texts.chunks(self.config.batch_size).enumerate() {
            let offset = chunk_idx * self.config.batch_size;
            let chunk_embeddings = self.embed_batch(chunk)?;
            for (row, values) in chunk_embeddings.rows().into_iter().enumerate() {
                embeddings.row_mut(offset + row).assign(&values);
            }
        }

        Ok(embeddings)
    }

    fn embed_batch(&mut self, texts: &[String]) -> Result<Array2<f64>> {
        let (ids, mask) = self.tokenizer.encode_batch(texts);
        let n = texts.len();
        let seq = self.tokenizer.max_positions();

        let output_name = self
            .session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| Error::Onnx("encoder declares no outputs".to_string()))?;

        let ids_value = Value::from_array(ids).map_err(|e| Error::Onnx(e.to_string()))?;
        let mask_value = Value::from_array(mask).map_err(|e| Error::Onnx(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => ids_value,
                "attention_mask" => mask_value,
            ])
            .map_err(|e| Error::Onnx(e.to_string()))?;

        let output = outputs
            .get(output_name.as_str())
            .ok_or_else(|| Error::Onnx(format!("encoder output `{output_name}` missing")))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Onnx(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
        if dims.len() != 3 || dims[0] != n || dims[1] != seq {
            return Err(Error::Onnx(format!(
                "encoder output shape {dims:?} does not match batch ({n}, {seq}, _)"
            )));
        }
        if dims[2] != self.config.hidden_size {
            return Err(Error::EncoderWidth {
                expected: self.config.hidden_size,
                actual: dims[2],
            });
        }

        debug!(batch = n, "encoded text batch");

        // First position of each sequence carries the pooled representation.
        let hidden = self.config.hidden_size;
        let mut embeddings = Array2::zeros((n, hidden));
        for row in 0..n {
            let start = row * seq * hidden;
            for col in 0..hidden {
                embeddings[[row, col]] = f64::from(data[start + col]);
            }
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_model_fails_before_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncoderConfig {
            model_path: dir.path().join("missing.onnx"),
            vocab_path: dir.path().join("vocab.txt"),
            ..EncoderConfig::default()
        };

        match OnnxEncoder::load(config).err() {
            Some(Error::EncoderResource { path }) => {
                assert!(path.ends_with("missing.onnx"));
            }
            other => panic!("expected EncoderResource error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_vocab_fails_before_session() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("encoder.onnx");
        std::fs::File::create(&model_path)
            .unwrap()
            .write_all(b"stub")
            .unwrap();

        let config = EncoderConfig {
            model_path,
            vocab_path: dir.path().join("missing_vocab.txt"),
            ..EncoderConfig::default()
        };

        match OnnxEncoder::load(config).err() {
            Some(Error::EncoderResource { path }) => {
                assert!(path.ends_with("missing_vocab.txt"));
            }
            other => panic!("expected EncoderResource error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = EncoderConfig::default();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.hidden_size, 768);
    }
}
