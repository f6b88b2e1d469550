//! Score the best saved checkpoint of a run on its test split.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use textcaps_core::data::{DataOptions, DataType, VocabOptions};
use textcaps_trainer::{TrainConfig, run_evaluation};

fn parse_data_type(s: &str) -> Result<DataType, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Parser)]
#[command(name = "evaluate")]
#[command(about = "Evaluate a saved text classifier checkpoint")]
#[command(version)]
struct Cli {
    #[arg(long, value_parser = parse_data_type, default_value = "imdb")]
    data_type: DataType,

    #[arg(long)]
    fine_grained: bool,

    /// Must match the value used for training
    #[arg(long, default_value_t = 2700)]
    text_length: usize,

    #[arg(long, default_value_t = 30)]
    batch_size: usize,

    /// Drop tokens seen fewer times in the training split
    #[arg(long, default_value_t = 1)]
    min_freq: usize,

    /// Cap the vocabulary, including <pad> and <unk>
    #[arg(long)]
    max_vocab_size: Option<usize>,

    #[arg(long, env = "TEXTCAPS_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, default_value = "epochs")]
    output_dir: PathBuf,

    #[arg(long)]
    cuda: bool,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let data = DataOptions {
        fine_grained: cli.fine_grained,
        text_length: cli.text_length,
        vocab: VocabOptions {
            min_freq: cli.min_freq,
            max_size: cli.max_vocab_size,
        },
        ..DataOptions::new(cli.data_type, cli.data_dir)
    };
    let config = TrainConfig {
        batch_size: cli.batch_size,
        output_dir: cli.output_dir,
        cuda: cli.cuda,
        ..TrainConfig::new(data)
    };

    match run_evaluation(&config) {
        Ok(report) => {
            for (label, row) in report.labels.iter().zip(&report.confusion) {
                let cells: Vec<String> = row.iter().map(|v| format!("{v:.3}")).collect();
                info!("{label:>16}: {}", cells.join(" "));
            }
        }
        Err(e) => {
            error!("Evaluation failed: {e:#}");
            std::process::exit(1);
        }
    }
}
