//! Pretrained word vectors in GloVe text format (`word v1 v2 ... vN`).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::data::Vocab;
use crate::error::{Result, TextCapsError};

#[derive(Debug, Clone)]
pub struct WordVectors {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    /// Read a vectors file, keeping only words present in `vocab` when given.
    pub fn load<P: AsRef<Path>>(path: P, vocab: Option<&Vocab>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let vectors = Self::parse(reader, vocab)?;
        info!(
            path = %path.display(),
            words = vectors.len(),
            dim = vectors.dim(),
            "Loaded pretrained vectors"
        );
        Ok(vectors)
    }

    pub fn parse<R: BufRead>(reader: R, vocab: Option<&Vocab>) -> Result<Self> {
        let mut dim = 0;
        let mut vectors = HashMap::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let values = parts
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| TextCapsError::Vectors(format!("line {}: {e}", idx + 1)))?;

            // word2vec-style header: "<count> <dim>"
            if idx == 0 && values.len() == 1 && word.parse::<usize>().is_ok() {
                continue;
            }
            if dim == 0 {
                dim = values.len();
            } else if values.len() != dim {
                return Err(TextCapsError::Vectors(format!(
                    "line {}: expected {dim} values, found {}",
                    idx + 1,
                    values.len()
                )));
            }
            if vocab.is_none_or(|v| v.id(word) != crate::data::UNK_ID) {
                vectors.insert(word.to_string(), values);
            }
        }

        if dim == 0 {
            return Err(TextCapsError::Vectors("no vectors found".into()));
        }
        Ok(Self { dim, vectors })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }

    /// Overwrite rows of a row-major `[vocab.len(), dim]` table with known
    /// vectors. Returns the number of rows replaced.
    pub fn fill_rows(&self, vocab: &Vocab, table: &mut [f32]) -> Result<usize> {
        if table.len() != vocab.len() * self.dim {
            return Err(TextCapsError::Vectors(format!(
                "embedding table has {} values, expected {} x {}",
                table.len(),
                vocab.len(),
                self.dim
            )));
        }
        let mut hits = 0;
        for (id, token) in vocab.tokens().iter().enumerate() {
            if let Some(v) = self.get(token) {
                table[id * self.dim..(id + 1) * self.dim].copy_from_slice(v);
                hits += 1;
            }
        }
        Ok(hits)
    }
}
