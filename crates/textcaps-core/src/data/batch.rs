//! Collation of examples into padded tensors.

use candle_core::{Device, Tensor};

use super::dataset::Example;
use super::sampler::{BucketBatchSampler, SamplerOptions};
use super::vocab::PAD_ID;
use crate::error::Result;

/// A padded batch ready for the model.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Token ids, `[batch, max_len]`, right-padded with [`PAD_ID`].
    pub tokens: Tensor,
    /// Class ids, `[batch]`.
    pub labels: Tensor,
    /// Class ids on the host, aligned with `labels`.
    pub targets: Vec<u32>,
    /// Unpadded lengths.
    pub lengths: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// One-hot label matrix `[batch, num_class]` in `f32`.
    pub fn one_hot(&self, num_class: usize) -> Result<Tensor> {
        one_hot(&self.targets, num_class, self.labels.device())
    }
}

/// Build a `[len, num_class]` one-hot matrix.
pub fn one_hot(targets: &[u32], num_class: usize, device: &Device) -> Result<Tensor> {
    let mut data = vec![0f32; targets.len() * num_class];
    for (row, &t) in targets.iter().enumerate() {
        if (t as usize) < num_class {
            data[row * num_class + t as usize] = 1.0;
        }
    }
    Ok(Tensor::from_vec(data, (targets.len(), num_class), device)?)
}

/// Pad and stack examples into a [`Batch`].
pub fn collate(examples: &[&Example], pad_id: u32, device: &Device) -> Result<Batch> {
    let max_len = examples.iter().map(|e| e.len()).max().unwrap_or(0);
    let mut data = Vec::with_capacity(examples.len() * max_len);
    for ex in examples {
        data.extend_from_slice(&ex.tokens);
        data.extend(std::iter::repeat_n(pad_id, max_len - ex.len()));
    }

    let targets: Vec<u32> = examples.iter().map(|e| e.label).collect();
    let tokens = Tensor::from_vec(data, (examples.len(), max_len), device)?;
    let labels = Tensor::from_slice(&targets, targets.len(), device)?;

    Ok(Batch {
        tokens,
        labels,
        targets,
        lengths: examples.iter().map(|e| e.len()).collect(),
    })
}

/// Iterates a dataset in sampler order, collating each batch on demand.
#[derive(Debug, Clone)]
pub struct DataLoader<'a> {
    examples: &'a [Example],
    sampler: BucketBatchSampler,
    device: Device,
}

impl<'a> DataLoader<'a> {
    pub fn new(examples: &'a [Example], options: SamplerOptions, device: &Device) -> Result<Self> {
        let sampler = BucketBatchSampler::new(examples.iter().map(Example::len).collect(), options)?;
        Ok(Self {
            examples,
            sampler,
            device: device.clone(),
        })
    }

    /// Batches per epoch.
    pub fn len(&self) -> usize {
        self.sampler.num_batches()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_examples(&self) -> usize {
        self.examples.len()
    }

    /// Collated batches for one epoch.
    pub fn iter(&self, epoch: usize) -> impl Iterator<Item = Result<Batch>> + '_ {
        self.sampler.batches(epoch).into_iter().map(move |indices| {
            let batch: Vec<&Example> = indices.iter().map(|&i| &self.examples[i]).collect();
            collate(&batch, PAD_ID, &self.device)
        })
    }
}
