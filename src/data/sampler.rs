use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::data::timeseries::TimeSeriesDataSet;
use crate::error::{DatasetError, Result};

/// Splits the windows of a dataset into batches of window indices, once per
/// epoch.
pub trait BatchSampler {
    fn batches(&mut self, dataset: &TimeSeriesDataSet) -> Vec<Vec<usize>>;
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(DatasetError::InvalidConfig(
            "batch_size must be larger than 0".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct RandomBatchSampler {
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: StdRng,
}

impl RandomBatchSampler {
    pub fn new(batch_size: usize, shuffle: bool, drop_last: bool, seed: u64) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            batch_size,
            shuffle,
            drop_last,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl BatchSampler for RandomBatchSampler {
    fn batches(&mut self, dataset: &TimeSeriesDataSet) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }
        indices
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }
}

/// Batches whose windows all start predicting at the same time step.
///
/// Needed by models whose predictions interact across series.
#[derive(Clone, Debug)]
pub struct TimeSynchronizedBatchSampler {
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: StdRng,
}

impl TimeSynchronizedBatchSampler {
    pub fn new(batch_size: usize, shuffle: bool, drop_last: bool, seed: u64) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            batch_size,
            shuffle,
            drop_last,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl BatchSampler for TimeSynchronizedBatchSampler {
    fn batches(&mut self, dataset: &TimeSeriesDataSet) -> Vec<Vec<usize>> {
        synchronized_batches(
            &dataset.decoder_start_times(),
            self.batch_size,
            self.shuffle,
            self.drop_last,
            &mut self.rng,
        )
    }
}

/// Groups window indices by `start_times`, chunks every group and optionally
/// shuffles members and batch order. `drop_last` drops the incomplete chunk of
/// each time step.
pub fn synchronized_batches(
    start_times: &[i64],
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    rng: &mut StdRng,
) -> Vec<Vec<usize>> {
    let mut by_time: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, time) in start_times.iter().enumerate() {
        by_time.entry(*time).or_default().push(idx);
    }

    let mut batches = Vec::new();
    for members in by_time.values_mut() {
        if shuffle {
            members.shuffle(rng);
        }
        batches.extend(
            members
                .chunks(batch_size)
                .filter(|chunk| !drop_last || chunk.len() == batch_size)
                .map(<[usize]>::to_vec),
        );
    }
    if shuffle {
        batches.shuffle(rng);
    }
    debug!(
        batches = batches.len(),
        time_steps = by_time.len(),
        "sampled synchronized batches"
    );
    batches
}
