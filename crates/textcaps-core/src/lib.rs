//! # TextCaps Core
//!
//! Building blocks for training a recurrent text classifier with a
//! capsule-style margin loss: corpus loading and vocabulary construction,
//! length-bucketed batching, the embedding + bidirectional GRU model, and the
//! margin loss itself.
//!
//! ## Quick Start
//!
//! ```rust
//! use textcaps_core::data::{DataLoader, DataOptions, DataType, RawDocument, SamplerOptions, preprocess};
//!
//! let docs = |pairs: &[(&str, &str)]| -> Vec<RawDocument> {
//!     pairs
//!         .iter()
//!         .map(|(text, label)| RawDocument { text: text.to_string(), label: label.to_string() })
//!         .collect()
//! };
//! let train = docs(&[("a fine film", "pos"), ("a dull film", "neg")]);
//! let test = docs(&[("fine", "pos")]);
//!
//! let options = DataOptions::new(DataType::Imdb, "data");
//! let data = preprocess(&train, &test, &options).unwrap();
//! assert_eq!(data.num_class(), 2);
//!
//! let loader = DataLoader::new(&data.train, SamplerOptions::sequential(2), &candle_core::Device::Cpu).unwrap();
//! assert_eq!(loader.len(), 1);
//! ```
pub mod data;
pub mod error;
pub mod loss;
pub mod model;

// Re-export primary API
pub use data::{
    Batch, BucketBatchSampler, DataLoader, DataOptions, DataType, Example, LoadedData,
    SamplerOptions, Vocab, load_data,
};
pub use error::{Result, TextCapsError};
pub use loss::MarginLoss;
pub use model::{ModelConfig, TextClassifier, WordVectors};
