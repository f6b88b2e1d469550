use serde::{Deserialize, Serialize};

use crate::error::{Result, TextCapsError};

/// Hyperparameters of the recurrent text classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub num_class: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    /// Stacked bidirectional GRU layers.
    pub num_layers: usize,
    /// Dropout between GRU layers and before the linear head.
    pub dropout: f32,
    /// Routing iterations at the start of training.
    pub num_iterations: usize,
}

impl ModelConfig {
    pub fn new(vocab_size: usize, num_class: usize) -> Self {
        Self {
            vocab_size,
            num_class,
            embed_dim: 300,
            hidden_dim: 512,
            num_layers: 2,
            dropout: 0.2,
            num_iterations: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("vocab_size", self.vocab_size),
            ("num_class", self.num_class),
            ("embed_dim", self.embed_dim),
            ("hidden_dim", self.hidden_dim),
            ("num_layers", self.num_layers),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(TextCapsError::InvalidConfig(format!(
                "{name} must be at least 1"
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TextCapsError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}
