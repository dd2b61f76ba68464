use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::data::item::WindowData;

/// Dense, row-aligned copy of the encoded panel.
///
/// Continuous features are scaled except for encoder-normalized and derived
/// columns, which are filled at read time. Time index, target, weight and the
/// per-row target scale are kept unscaled for window arithmetic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorStore {
    pub continuous: Array2<f32>,   // [rows, reals]
    pub categorical: Array2<i64>,  // [rows, flat categoricals]
    pub groups: Array2<i64>,       // [rows, group ids]
    pub target_scale: Array2<f32>, // [rows, 2]
    pub time_idx: Vec<i64>,
    pub target: Vec<f32>,
    pub weight: Option<Vec<f32>>,
}

impl TensorStore {
    pub fn new(
        continuous: &[Vec<f32>],
        categorical: &[Vec<i64>],
        groups: &[Vec<i64>],
        target_scale: &[[f32; 2]],
        time_idx: Vec<i64>,
        target: Vec<f32>,
        weight: Option<Vec<f32>>,
    ) -> Self {
        let rows = time_idx.len();
        Self {
            continuous: Array2::from_shape_fn((rows, continuous.len()), |(r, c)| continuous[c][r]),
            categorical: Array2::from_shape_fn((rows, categorical.len()), |(r, c)| {
                categorical[c][r]
            }),
            groups: Array2::from_shape_fn((rows, groups.len()), |(r, c)| groups[c][r]),
            target_scale: Array2::from_shape_fn((rows, 2), |(r, c)| target_scale[r][c]),
            time_idx,
            target,
            weight,
        }
    }

    pub fn len(&self) -> usize {
        self.time_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_idx.is_empty()
    }

    /// Owned copy of rows `start..=end`.
    pub fn window(&self, start: usize, end: usize) -> WindowData {
        WindowData {
            continuous: self.continuous.slice(s![start..=end, ..]).to_owned(),
            categorical: self.categorical.slice(s![start..=end, ..]).to_owned(),
            time: self.time_idx[start..=end].to_vec(),
            target: self.target[start..=end].to_vec(),
            weight: self.weight.as_ref().map(|w| w[start..=end].to_vec()),
        }
    }

    pub fn group_codes(&self, row: usize) -> Vec<i64> {
        self.groups.row(row).to_vec()
    }

    pub fn row_target_scale(&self, row: usize) -> [f32; 2] {
        [self.target_scale[[row, 0]], self.target_scale[[row, 1]]]
    }
}
