//! Batch iteration over a [`PairedDataset`].

use anyhow::Result;
use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::adapter::images_to_batch;
use crate::dataset::PairedDataset;

#[derive(Config, Debug)]
pub struct DataLoaderConfig {
    #[config(default = 2)]
    pub batch_size: usize,
    /// Size of the shuffle buffer; 0 keeps index order.
    #[config(default = 4)]
    pub shuffle_buffer: usize,
    #[config(default = 42)]
    pub seed: u64,
}

/// Network inputs of one batch.
#[derive(Debug, Clone)]
pub struct BatchInputs<B: Backend> {
    /// `[N, 1, Dm, Hm, Wm]`
    pub moving_image: Tensor<B, 5>,
    /// `[N, 1, Df, Hf, Wf]`
    pub fixed_image: Tensor<B, 5>,
    pub moving_label: Option<Tensor<B, 5>>,
}

/// One batch of registration pairs.
#[derive(Debug, Clone)]
pub struct PairedBatch<B: Backend> {
    pub inputs: BatchInputs<B>,
    /// Target labels, `[N, 1, Df, Hf, Wf]`.
    pub fixed_label: Option<Tensor<B, 5>>,
    pub indices: Vec<usize>,
}

impl<B: Backend> PairedBatch<B> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Visit order produced by a fixed-size shuffle buffer.
///
/// The first `buffer` indices fill the buffer; every later index replaces a
/// randomly chosen buffered one, which is emitted. The remainder drains in
/// random order. A buffer of 0 or 1 keeps index order.
pub fn shuffle_order(len: usize, buffer: usize, seed: u64) -> Vec<usize> {
    if buffer <= 1 {
        return (0..len).collect();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut pending = Vec::with_capacity(buffer.min(len));
    let mut order = Vec::with_capacity(len);

    for index in 0..len {
        if pending.len() < buffer {
            pending.push(index);
            continue;
        }
        let pick = rng.gen_range(0..pending.len());
        order.push(std::mem::replace(&mut pending[pick], index));
    }
    while !pending.is_empty() {
        let pick = rng.gen_range(0..pending.len());
        order.push(pending.swap_remove(pick));
    }

    order
}

/// Split a dataset of `len` samples into batches of indices.
///
/// Training shuffles with `seed + epoch` and drops the trailing incomplete
/// batch, unless the whole split is smaller than one batch. Evaluation keeps
/// index order and the final partial batch.
pub fn batch_plan(
    len: usize,
    training: bool,
    config: &DataLoaderConfig,
    epoch: usize,
) -> Vec<Vec<usize>> {
    let batch_size = config.batch_size.max(1);

    if !training {
        let order: Vec<usize> = (0..len).collect();
        return order.chunks(batch_size).map(<[usize]>::to_vec).collect();
    }

    let order = if config.shuffle_buffer > 0 {
        shuffle_order(
            len,
            config.shuffle_buffer,
            config.seed.wrapping_add(epoch as u64),
        )
    } else {
        (0..len).collect()
    };

    if len > 0 && len < batch_size {
        return vec![order];
    }
    order
        .chunks_exact(batch_size)
        .map(<[usize]>::to_vec)
        .collect()
}

/// Iterator over the batches of one pass.
pub struct Batches<'a, B: Backend> {
    dataset: &'a PairedDataset<B>,
    plan: std::vec::IntoIter<Vec<usize>>,
    device: B::Device,
}

impl<'a, B: Backend> Batches<'a, B> {
    fn assemble(&self, indices: Vec<usize>) -> Result<PairedBatch<B>> {
        let samples: Vec<_> = indices
            .iter()
            .map(|&i| {
                self.dataset
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("Sample index {} out of range", i))
            })
            .collect::<Result<_>>()?;

        let moving: Vec<_> = samples.iter().map(|s| &s.moving_image).collect();
        let fixed: Vec<_> = samples.iter().map(|s| &s.fixed_image).collect();
        let moving_image = images_to_batch(&moving)?.to_device(&self.device);
        let fixed_image = images_to_batch(&fixed)?.to_device(&self.device);

        let (moving_label, fixed_label) = if self.dataset.is_labeled() {
            let moving: Option<Vec<_>> = samples.iter().map(|s| s.moving_label.as_ref()).collect();
            let fixed: Option<Vec<_>> = samples.iter().map(|s| s.fixed_label.as_ref()).collect();
            match (moving, fixed) {
                (Some(moving), Some(fixed)) => (
                    Some(images_to_batch(&moving)?.to_device(&self.device)),
                    Some(images_to_batch(&fixed)?.to_device(&self.device)),
                ),
                _ => anyhow::bail!("Labeled dataset has a sample without labels"),
            }
        } else {
            (None, None)
        };

        Ok(PairedBatch {
            inputs: BatchInputs {
                moving_image,
                fixed_image,
                moving_label,
            },
            fixed_label,
            indices,
        })
    }
}

impl<B: Backend> Iterator for Batches<'_, B> {
    type Item = Result<PairedBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.plan.next()?;
        Some(self.assemble(indices))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.plan.size_hint()
    }
}

impl<B: Backend> PairedDataset<B> {
    /// Batches for one pass over the dataset.
    pub fn batches(
        &self,
        training: bool,
        config: &DataLoaderConfig,
        epoch: usize,
        device: &B::Device,
    ) -> Batches<'_, B> {
        let plan = batch_plan(self.len(), training, config, epoch);
        Batches {
            dataset: self,
            plan: plan.into_iter(),
            device: device.clone(),
        }
    }

    /// Number of batches a pass yields.
    pub fn num_batches(&self, training: bool, config: &DataLoaderConfig) -> usize {
        batch_plan(self.len(), training, config, 0).len()
    }
}
