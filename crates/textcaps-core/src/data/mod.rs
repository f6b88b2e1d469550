pub mod batch;
pub mod dataset;
pub mod sampler;
pub mod tokenizer;
pub mod vocab;

pub use batch::{Batch, DataLoader, collate, one_hot};
pub use dataset::{DataOptions, DataType, Example, LoadedData, RawDocument, load_data, preprocess};
pub use sampler::{BucketBatchSampler, SamplerOptions};
pub use tokenizer::Tokenizer;
pub use vocab::{PAD_ID, UNK_ID, Vocab, VocabOptions};
