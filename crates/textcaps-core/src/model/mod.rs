pub mod classifier;
pub mod config;
pub mod encoder;
pub mod vectors;

pub use classifier::{EMBEDDING_PREFIX, TextClassifier};
pub use config::ModelConfig;
pub use encoder::BiGru;
pub use vectors::WordVectors;
