//! Run configuration assembled from the command line.

use std::path::PathBuf;

use anyhow::{Result, bail};
use candle_core::Device;
use serde::{Deserialize, Serialize};

use textcaps_core::data::{DataOptions, DataType};
use textcaps_core::ModelConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data: DataOptions,
    pub batch_size: usize,
    pub num_epochs: usize,
    /// Routing iterations at epoch 1.
    pub init_iterations: usize,
    pub routing_milestones: Vec<usize>,
    pub learning_milestones: Vec<usize>,
    pub learning_rate: f64,
    /// Learning rate decay factor applied at each milestone.
    pub lr_gamma: f64,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub dropout: f32,
    /// GloVe-format vectors used to initialise (and freeze) the embedding.
    pub vectors: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub visdom_url: Option<String>,
    pub seed: u64,
    /// Log training progress every this many optimizer steps.
    pub log_every: usize,
    pub cuda: bool,
}

impl TrainConfig {
    pub fn new(data: DataOptions) -> Self {
        Self {
            data,
            batch_size: 30,
            num_epochs: 100,
            init_iterations: 1,
            routing_milestones: vec![10, 30],
            learning_milestones: vec![20, 40],
            learning_rate: 1e-3,
            lr_gamma: 0.1,
            embed_dim: 300,
            hidden_dim: 512,
            num_layers: 2,
            dropout: 0.2,
            vectors: None,
            output_dir: PathBuf::from("epochs"),
            visdom_url: None,
            seed: 42,
            log_every: 100,
            cuda: false,
        }
    }

    /// Checkpoint and plot environment name.
    pub fn run_name(&self) -> String {
        self.data.run_name()
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type
    }

    /// Model hyperparameters for a corpus of the given shape.
    pub fn model_config(&self, vocab_size: usize, num_class: usize) -> ModelConfig {
        ModelConfig {
            vocab_size,
            num_class,
            embed_dim: self.embed_dim,
            hidden_dim: self.hidden_dim,
            num_layers: self.num_layers,
            dropout: self.dropout,
            num_iterations: self.init_iterations,
        }
    }

    pub fn device(&self) -> Result<Device> {
        if self.cuda {
            Ok(Device::cuda_if_available(0)?)
        } else {
            Ok(Device::Cpu)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if self.data.text_length == 0 {
            bail!("text length must be at least 1");
        }
        if self.learning_rate <= 0.0 {
            bail!("learning rate must be positive, got {}", self.learning_rate);
        }
        if self.log_every == 0 {
            bail!("log interval must be at least 1");
        }
        Ok(())
    }
}
