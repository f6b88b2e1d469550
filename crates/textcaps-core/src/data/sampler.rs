//! # Bucketed batch sampler
//!
//! Groups dataset indices into batches of similar sequence length so that
//! padding overhead stays small. Indices are cut into buckets of
//! `batch_size * bucket_size_multiplier`, each bucket is sorted by length and
//! split into batches. When shuffling, bucket membership and batch order are
//! permuted with a generator seeded from `(seed, epoch)`.

use oorandom::Rand64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TextCapsError};

/// Sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerOptions {
    pub batch_size: usize,
    pub bucket_size_multiplier: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl SamplerOptions {
    /// Deterministic, unshuffled sampling for evaluation.
    pub fn sequential(batch_size: usize) -> Self {
        Self {
            batch_size,
            bucket_size_multiplier: 100,
            shuffle: false,
            seed: 0,
        }
    }

    /// Shuffled sampling for training.
    pub fn shuffled(batch_size: usize, seed: u64) -> Self {
        Self {
            shuffle: true,
            seed,
            ..Self::sequential(batch_size)
        }
    }
}

#[derive(Debug, Clone)]
pub struct BucketBatchSampler {
    lengths: Vec<usize>,
    options: SamplerOptions,
}

impl BucketBatchSampler {
    /// Create a sampler over items with the given sequence lengths.
    pub fn new(lengths: Vec<usize>, options: SamplerOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(TextCapsError::InvalidConfig(
                "batch_size must be at least 1".into(),
            ));
        }
        if options.bucket_size_multiplier == 0 {
            return Err(TextCapsError::InvalidConfig(
                "bucket_size_multiplier must be at least 1".into(),
            ));
        }
        Ok(Self { lengths, options })
    }

    /// Number of items sampled per epoch.
    pub fn num_items(&self) -> usize {
        self.lengths.len()
    }

    /// Number of batches produced per epoch.
    pub fn num_batches(&self) -> usize {
        let n = self.lengths.len();
        let bucket = self.bucket_size();
        let full = n / bucket;
        let rest = n % bucket;
        full * bucket.div_ceil(self.options.batch_size) + rest.div_ceil(self.options.batch_size)
    }

    fn bucket_size(&self) -> usize {
        self.options
            .batch_size
            .saturating_mul(self.options.bucket_size_multiplier)
    }

    /// Index batches for one epoch. Every index appears exactly once.
    pub fn batches(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut rng = self
            .options
            .shuffle
            .then(|| Rand64::new(((self.options.seed as u128) << 64) | epoch as u128));

        let mut indices: Vec<usize> = (0..self.lengths.len()).collect();
        if let Some(rng) = rng.as_mut() {
            shuffle(&mut indices, rng);
        }

        let mut batches = Vec::with_capacity(self.num_batches());
        for bucket in indices.chunks_mut(self.bucket_size()) {
            bucket.sort_by_key(|&i| (self.lengths[i], i));
            batches.extend(
                bucket
                    .chunks(self.options.batch_size)
                    .map(<[usize]>::to_vec),
            );
        }

        if let Some(rng) = rng.as_mut() {
            shuffle(&mut batches, rng);
        }
        batches
    }
}

/// Fisher-Yates shuffle.
fn shuffle<T>(items: &mut [T], rng: &mut Rand64) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(n: usize) -> Vec<usize> {
        (0..n).map(|i| (i * 7919) % 23 + 1).collect()
    }

    fn assert_covers_once(batches: &[Vec<usize>], n: usize) {
        let mut seen: Vec<usize> = batches.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_sequential_covers_dataset_once_in_length_order() {
        let lens = lengths(97);
        let sampler = BucketBatchSampler::new(lens.clone(), SamplerOptions::sequential(10)).unwrap();
        let batches = sampler.batches(0);

        assert_covers_once(&batches, 97);
        assert_eq!(batches.len(), 10);
        assert_eq!(batches.len(), sampler.num_batches());
        assert_eq!(batches.last().unwrap().len(), 7);

        // One bucket covers the whole set, so the flattened order is sorted.
        let flat: Vec<usize> = batches.iter().flatten().map(|&i| lens[i]).collect();
        assert!(flat.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_shuffled_covers_dataset_once_every_epoch() {
        let sampler =
            BucketBatchSampler::new(lengths(250), SamplerOptions {
                bucket_size_multiplier: 3,
                ..SamplerOptions::shuffled(8, 42)
            })
            .unwrap();

        for epoch in 0..4 {
            let batches = sampler.batches(epoch);
            assert_covers_once(&batches, 250);
            assert_eq!(batches.len(), sampler.num_batches());
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 8));
        }
    }

    #[test]
    fn test_batches_are_length_sorted_within_bucket() {
        let lens = lengths(120);
        let sampler = BucketBatchSampler::new(lens.clone(), SamplerOptions {
            bucket_size_multiplier: 2,
            ..SamplerOptions::shuffled(6, 7)
        })
        .unwrap();

        for batch in sampler.batches(3) {
            let batch_lens: Vec<usize> = batch.iter().map(|&i| lens[i]).collect();
            assert!(batch_lens.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_shuffle_is_deterministic_per_epoch() {
        let sampler = BucketBatchSampler::new(lengths(64), SamplerOptions::shuffled(4, 1)).unwrap();
        assert_eq!(sampler.batches(2), sampler.batches(2));
        assert_ne!(sampler.batches(1), sampler.batches(2));
    }

    #[test]
    fn test_empty_and_invalid() {
        let sampler = BucketBatchSampler::new(vec![], SamplerOptions::sequential(4)).unwrap();
        assert!(sampler.batches(0).is_empty());
        assert_eq!(sampler.num_batches(), 0);

        assert!(BucketBatchSampler::new(vec![1], SamplerOptions::sequential(0)).is_err());
    }
}
