//! # Recurrent text classifier
//!
//! Embedding lookup, stacked bidirectional GRU, dropout and a linear head.
//! The last timestep of the encoder output (forward and backward halves
//! concatenated) is projected to one logit per class.

use candle_core::{IndexOp, Result, Tensor};
use candle_nn::{Dropout, Embedding, Linear, Module, ModuleT, VarBuilder, embedding, linear};

use super::config::ModelConfig;
use super::encoder::BiGru;

/// Parameter name prefix of the embedding table.
pub const EMBEDDING_PREFIX: &str = "embedding";

pub struct TextClassifier {
    embedding: Embedding,
    encoder: BiGru,
    dropout: Dropout,
    linear: Linear,
    config: ModelConfig,
    num_iterations: usize,
}

impl TextClassifier {
    /// Create the model, registering its parameters in `vb`.
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let embedding = embedding(config.vocab_size, config.embed_dim, vb.pp(EMBEDDING_PREFIX))?;
        let encoder = BiGru::new(
            config.embed_dim,
            config.hidden_dim,
            config.num_layers,
            config.dropout,
            vb.pp("encoder"),
        )?;
        let linear = linear(encoder.output_dim(), config.num_class, vb.pp("linear"))?;

        Ok(Self {
            embedding,
            encoder,
            dropout: Dropout::new(config.dropout),
            linear,
            config: config.clone(),
            num_iterations: config.num_iterations,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Current routing iterations.
    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    pub fn set_num_iterations(&mut self, num_iterations: usize) {
        self.num_iterations = num_iterations;
    }
}

impl ModuleT for TextClassifier {
    /// `tokens`: `[batch, seq]` u32 ids. Returns `[batch, num_class]` logits.
    fn forward_t(&self, tokens: &Tensor, train: bool) -> Result<Tensor> {
        let (_, seq_len) = tokens.dims2()?;
        if seq_len == 0 {
            candle_core::bail!("cannot classify an empty token sequence");
        }

        let embed = self.embedding.forward(tokens)?;
        let out = self.encoder.forward_t(&embed, train)?;
        let last = out.i((.., seq_len - 1, ..))?;

        let last = self.dropout.forward_t(&last, train)?;
        self.linear.forward(&last)
    }
}
