//! WordPiece tokenization for the pretrained encoder
//!
//! Mirrors the uncased-BERT convention: lowercase, split on whitespace and
//! punctuation, then greedy longest-match subwords with a `##` continuation
//! prefix. Every encoded sequence is `[CLS] ... [SEP]`, truncated and padded
//! to a fixed position count so batches have a constant shape.

use ndarray::Array2;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";

/// Subword tokenizer backed by a `vocab.txt`-style vocabulary.
#[derive(Debug, Clone)]
pub struct WordPieceTokenizer {
    vocab: HashMap<String, i64>,
    cls_id: i64,
    sep_id: i64,
    pad_id: i64,
    unk_id: i64,
    max_positions: usize,
}

impl WordPieceTokenizer {
    /// Load a vocabulary file (one token per line, line number = id).
    pub fn from_vocab_file<P: AsRef<Path>>(path: P, max_positions: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::EncoderResource {
                path: path.to_path_buf(),
            });
        }

        let reader = BufReader::new(File::open(path)?);
        let lines = reader
            .lines()
            .collect::<std::io::Result<Vec<String>>>()?;
        Self::from_vocab_lines(lines, max_positions)
    }

    /// Build a tokenizer from in-memory vocabulary lines.
    pub fn from_vocab_lines<I, S>(lines: I, max_positions: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if max_positions < 2 {
            return Err(Error::InvalidConfig {
                reason: format!("max token positions {max_positions} leaves no room for text"),
            });
        }

        let mut vocab = HashMap::new();
        for (idx, line) in lines.into_iter().enumerate() {
            vocab.insert(line.as_ref().trim_end().to_string(), idx as i64);
        }

        let special = |token: &'static str| -> Result<i64> {
            vocab
                .get(token)
                .copied()
                .ok_or(Error::MissingSpecialToken { token })
        };

        Ok(Self {
            cls_id: special(CLS_TOKEN)?,
            sep_id: special(SEP_TOKEN)?,
            pad_id: special(PAD_TOKEN)?,
            unk_id: special(UNK_TOKEN)?,
            vocab,
            max_positions,
        })
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Lowercase, split on whitespace, and break out punctuation.
    fn pre_tokenize(text: &str) -> Vec<String> {
        let mut words = Vec::new();
        for chunk in text.to_lowercase().split_whitespace() {
            let mut current = String::new();
            for c in chunk.chars() {
                if c.is_ascii_punctuation() {
                    if !current.is_empty() {
                        words.push(std::mem::take(&mut current));
                    }
                    words.push(c.to_string());
                } else {
                    current.push(c);
                }
            }
            if !current.is_empty() {
                words.push(current);
            }
        }
        words
    }

    /// Greedy longest-match subword split of a single word.
    ///
    /// A word with any unmatched remainder collapses to `[UNK]`.
    fn wordpiece(&self, word: &str) -> Vec<i64> {
        let chars: Vec<char> = word.chars().collect();
        let mut ids = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = chars.len();
            let mut matched = None;
            while start < end {
                let mut piece: String = chars[start..end].iter().collect();
                if start > 0 {
                    piece.insert_str(0, "##");
                }
                if let Some(&id) = self.vocab.get(&piece) {
                    matched = Some((id, end));
                    break;
                }
                end -= 1;
            }

            match matched {
                Some((id, next)) => {
                    ids.push(id);
                    start = next;
                }
                None => return vec![self.unk_id],
            }
        }

        ids
    }

    /// Encode one text as `[CLS] subwords [SEP]`, truncated to the position
    /// budget. No padding here; see [`encode_batch`](Self::encode_batch).
    pub fn encode(&self, text: &str) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.max_positions);
        ids.push(self.cls_id);
        for word in Self::pre_tokenize(text) {
            ids.extend(self.wordpiece(&word));
            if ids.len() >= self.max_positions - 1 {
                break;
            }
        }
        ids.truncate(self.max_positions - 1);
        ids.push(self.sep_id);
        ids
    }

    /// Encode a batch to fixed-shape `(n, max_positions)` id and attention
    /// mask matrices, padded with `[PAD]`.
    pub fn encode_batch(&self, texts: &[String]) -> (Array2<i64>, Array2<i64>) {
        let n = texts.len();
        let mut ids = Array2::from_elem((n, self.max_positions), self.pad_id);
        let mut mask = Array2::zeros((n, self.max_positions));

        for (i, text) in texts.iter().enumerate() {
            for (j, id) in self.encode(text).into_iter().enumerate() {
                ids[[i, j]] = id;
                mask[[i, j]] = 1;
            }
        }

        (ids, mask)
    }
}
