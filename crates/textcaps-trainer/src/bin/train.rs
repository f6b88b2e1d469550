//! Train the text classifier on one corpus.

use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use textcaps_core::data::{DataOptions, DataType, VocabOptions};
use textcaps_trainer::{TrainConfig, run_training};

fn parse_data_type(s: &str) -> Result<DataType, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a margin-loss text classifier")]
#[command(version)]
struct Cli {
    /// Corpus to train on
    #[arg(long, value_parser = parse_data_type, default_value = "imdb")]
    data_type: DataType,

    /// Use fine-grained labels (reuters, yelp, amazon)
    #[arg(long)]
    fine_grained: bool,

    /// Maximum tokens kept per document
    #[arg(long, default_value_t = 2700)]
    text_length: usize,

    /// Routing iterations at the first epoch
    #[arg(long, default_value_t = 1)]
    init_iterations: usize,

    #[arg(long, default_value_t = 30)]
    batch_size: usize,

    /// Epochs after which routing iterations grow by one
    #[arg(long, num_args = 1.., default_values_t = [10, 30])]
    routing_milestones: Vec<usize>,

    /// Epochs after which the learning rate is multiplied by 0.1
    #[arg(long, num_args = 1.., default_values_t = [20, 40])]
    learning_milestones: Vec<usize>,

    #[arg(long, default_value_t = 100)]
    num_epochs: usize,

    /// Root holding one directory per corpus
    #[arg(long, env = "TEXTCAPS_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Checkpoint directory
    #[arg(long, default_value = "epochs")]
    output_dir: PathBuf,

    /// Visdom server; plots go to the log when unset
    #[arg(long, env = "TEXTCAPS_VISDOM_URL")]
    visdom_url: Option<String>,

    /// Pretrained GloVe-format vectors; freezes the embedding
    #[arg(long)]
    vectors: Option<PathBuf>,

    #[arg(long, default_value_t = 300)]
    embed_dim: usize,

    #[arg(long, default_value_t = 512)]
    hidden_dim: usize,

    #[arg(long, default_value_t = 2)]
    num_layers: usize,

    #[arg(long, default_value_t = 0.2)]
    dropout: f32,

    #[arg(long, default_value_t = 1e-3)]
    learning_rate: f64,

    /// Shuffling seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log progress every N optimizer steps
    #[arg(long, default_value_t = 100)]
    log_every: usize,

    /// Drop tokens seen fewer times in the training split
    #[arg(long, default_value_t = 1)]
    min_freq: usize,

    /// Cap the vocabulary, including <pad> and <unk>
    #[arg(long)]
    max_vocab_size: Option<usize>,

    /// Ignore the preprocessed cache and rebuild it
    #[arg(long)]
    rebuild_cache: bool,

    /// Train on the first CUDA device when available
    #[arg(long)]
    cuda: bool,
}

impl Cli {
    fn into_config(self) -> TrainConfig {
        let data = DataOptions {
            fine_grained: self.fine_grained,
            text_length: self.text_length,
            rebuild_cache: self.rebuild_cache,
            vocab: VocabOptions {
                min_freq: self.min_freq,
                max_size: self.max_vocab_size,
            },
            ..DataOptions::new(self.data_type, self.data_dir)
        };
        TrainConfig {
            batch_size: self.batch_size,
            num_epochs: self.num_epochs,
            init_iterations: self.init_iterations,
            routing_milestones: self.routing_milestones,
            learning_milestones: self.learning_milestones,
            learning_rate: self.learning_rate,
            embed_dim: self.embed_dim,
            hidden_dim: self.hidden_dim,
            num_layers: self.num_layers,
            dropout: self.dropout,
            vectors: self.vectors,
            output_dir: self.output_dir,
            visdom_url: self.visdom_url,
            seed: self.seed,
            log_every: self.log_every,
            cuda: self.cuda,
            ..TrainConfig::new(data)
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = Cli::parse().into_config();
    if let Err(e) = run_training(&config) {
        error!("Training failed: {e:#}");
        std::process::exit(1);
    }
}
