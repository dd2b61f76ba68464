use std::ops::Range;

use ndarray::{s, Array2, Axis};
use rand::Rng;
use rand_distr::{Beta, Binomial, Distribution};
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// One example as produced by the dataset, before collation.
///
/// `x_cat` and `x_cont` cover encoder and decoder steps; the first
/// `encoder_length` rows belong to the encoder. Target and weight are never
/// part of the feature arrays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowItem {
    pub x_cat: Array2<i64>,  // [T, C]
    pub x_cont: Array2<f32>, // [T, R]
    pub encoder_length: usize,
    pub decoder_length: usize,
    pub encoder_target: Vec<f32>,
    pub decoder_target: Vec<f32>,
    pub weight: Option<Vec<f32>>,
    pub target_scale: [f32; 2],
    pub groups: Vec<i64>,
    pub time_idx: Vec<i64>,
}

impl WindowItem {
    pub fn len(&self) -> usize {
        self.encoder_length + self.decoder_length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Constant fill values, already encoded, for reconstructed time steps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodedFill {
    pub continuous: Vec<(usize, f32)>,
    pub categorical: Vec<(usize, i64)>,
    pub target: Option<f32>,
}

/// Rows of one window copied out of the tensor store.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowData {
    pub continuous: Array2<f32>,
    pub categorical: Array2<i64>,
    pub time: Vec<i64>,
    pub target: Vec<f32>,
    pub weight: Option<Vec<f32>>,
}

impl WindowData {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Repeats every row by its distance in time to the next row so that each
    /// time step is present. Returns the mask of the inserted rows.
    pub fn fill_gaps(&mut self) -> Vec<bool> {
        let n = self.time.len();
        let indices: Vec<usize> = (0..n)
            .flat_map(|i| {
                let repetitions = if i + 1 < n {
                    (self.time[i + 1] - self.time[i]).max(0) as usize
                } else {
                    1
                };
                std::iter::repeat(i).take(repetitions)
            })
            .collect();
        let synthetic: Vec<bool> = (0..indices.len())
            .map(|k| k > 0 && indices[k] == indices[k - 1])
            .collect();

        let mut time = Vec::with_capacity(indices.len());
        for (k, i) in indices.iter().enumerate() {
            let t = if synthetic[k] {
                time[k - 1] + 1
            } else {
                self.time[*i]
            };
            time.push(t);
        }

        self.continuous = self.continuous.select(Axis(0), &indices);
        self.categorical = self.categorical.select(Axis(0), &indices);
        self.target = indices.iter().map(|i| self.target[*i]).collect();
        self.weight = self
            .weight
            .as_ref()
            .map(|w| indices.iter().map(|i| w[*i]).collect());
        self.time = time;
        synthetic
    }

    /// Overwrites inserted rows with constant fill values. Columns without a
    /// fill value keep the repeated (forward filled) value.
    pub fn apply_fill(&mut self, synthetic: &[bool], fill: &EncodedFill) {
        for (row, _) in synthetic.iter().enumerate().filter(|(_, s)| **s) {
            for (col, value) in fill.continuous.iter() {
                self.continuous[[row, *col]] = *value;
            }
            for (col, value) in fill.categorical.iter() {
                self.categorical[[row, *col]] = *value;
            }
            if let Some(value) = fill.target {
                self.target[row] = value;
            }
        }
    }

    pub fn truncate(&mut self, rows: Range<usize>) {
        self.continuous = self.continuous.slice(s![rows.clone(), ..]).to_owned();
        self.categorical = self.categorical.slice(s![rows.clone(), ..]).to_owned();
        self.time = self.time[rows.clone()].to_vec();
        self.target = self.target[rows.clone()].to_vec();
        self.weight = self.weight.as_ref().map(|w| w[rows].to_vec());
    }
}

/// Number of steps to predict for a window ending at `last_time`.
pub fn decoder_length(
    last_time: i64,
    min_prediction_idx: i64,
    max_prediction_length: usize,
    sequence_length: usize,
    min_encoder_length: usize,
) -> i64 {
    (last_time - (min_prediction_idx - 1))
        .min(max_prediction_length as i64)
        .min(sequence_length as i64 - min_encoder_length as i64)
}

/// Samples shorter encoder and decoder lengths. Probabilities are drawn from
/// `Beta(alpha, beta)`, lengths from binomials over the current lengths.
pub fn randomize_lengths<R: Rng + ?Sized>(
    rng: &mut R,
    concentrations: (f64, f64),
    encoder_length: usize,
    decoder_length: usize,
    min_encoder_length: usize,
    min_prediction_length: usize,
) -> Result<(usize, usize)> {
    let (alpha, beta) = concentrations;
    let distribution =
        Beta::new(alpha, beta).map_err(|err| DatasetError::InvalidConfig(err.to_string()))?;
    let encoder_probability = distribution.sample(rng);
    let decoder_probability = distribution.sample(rng);

    let new_encoder_length = binomial(rng, encoder_length, encoder_probability)?
        .max(min_encoder_length)
        .min(encoder_length);
    let new_decoder_length = binomial(rng, decoder_length, decoder_probability)?
        .max(min_prediction_length)
        .min(decoder_length);
    Ok((new_encoder_length, new_decoder_length))
}

fn binomial<R: Rng + ?Sized>(rng: &mut R, trials: usize, probability: f64) -> Result<usize> {
    let probability = if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let distribution = Binomial::new(trials as u64, probability)
        .map_err(|err| DatasetError::InvalidConfig(err.to_string()))?;
    Ok(distribution.sample(rng) as usize)
}

/// Position of each step relative to the first prediction, in units of the
/// maximum encoder length.
pub fn relative_time_idx(encoder_length: usize, decoder_length: usize, max_encoder_length: usize) -> Vec<f32> {
    (0..encoder_length + decoder_length)
        .map(|k| (k as f32 - encoder_length as f32) / max_encoder_length as f32)
        .collect()
}

pub fn scaled_encoder_length(encoder_length: usize, max_encoder_length: usize) -> f32 {
    let max = max_encoder_length as f32;
    (encoder_length as f32 - 0.5 * max) / max * 2.0
}
