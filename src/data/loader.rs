use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::batchitem::BatchItem;
use crate::data::collate::Collator;
use crate::data::item::WindowItem;
use crate::data::sampler::BatchSampler;
use crate::data::timeseries::TimeSeriesDataSet;
use crate::error::Result;

/// Single threaded loader driving a [`BatchSampler`] over a dataset.
///
/// Randomized window lengths are drawn from the loader's own seeded generator
/// so that epochs are reproducible.
pub struct WindowDataLoader<B: Backend, S: BatchSampler> {
    dataset: Arc<TimeSeriesDataSet>,
    sampler: S,
    collator: Collator<B>,
    rng: StdRng,
}

impl<B: Backend, S: BatchSampler> WindowDataLoader<B, S> {
    pub fn new(dataset: Arc<TimeSeriesDataSet>, sampler: S, device: B::Device, seed: u64) -> Self {
        Self {
            dataset,
            sampler,
            collator: Collator::new(device),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn dataset(&self) -> &TimeSeriesDataSet {
        &self.dataset
    }

    /// Batches of one epoch.
    pub fn iter(&mut self) -> WindowBatchIter<'_, B> {
        let Self {
            dataset,
            sampler,
            collator,
            rng,
        } = self;
        let batches = sampler.batches(dataset);
        WindowBatchIter {
            dataset: &**dataset,
            collator,
            rng,
            batches: batches.into_iter(),
        }
    }
}

pub struct WindowBatchIter<'a, B: Backend> {
    dataset: &'a TimeSeriesDataSet,
    collator: &'a Collator<B>,
    rng: &'a mut StdRng,
    batches: std::vec::IntoIter<Vec<usize>>,
}

impl<'a, B: Backend> Iterator for WindowBatchIter<'a, B> {
    type Item = Result<BatchItem<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.batches.next()?;
        let mut items: Vec<WindowItem> = Vec::with_capacity(indices.len());
        for idx in indices {
            match self.dataset.get_with_rng(idx, &mut *self.rng) {
                Ok(item) => items.push(item),
                Err(err) => return Some(Err(err)),
            }
        }
        Some(Ok(self.collator.batch(items)))
    }
}
