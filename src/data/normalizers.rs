use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::table::Category;
use crate::error::{DatasetError, Result};

const EPS: f64 = 1e-8;

/// Pre-transform applied before scaling and reversed after de-scaling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transformation {
    None,
    Log,
    Log1p,
    Softplus,
    Logit,
}

impl Transformation {
    pub fn forward(&self, x: f64) -> f64 {
        match self {
            Transformation::None => x,
            Transformation::Log => x.max(EPS).ln(),
            Transformation::Log1p => x.max(EPS - 1.0).ln_1p(),
            Transformation::Softplus => {
                let x = x.max(EPS);
                if x > 20.0 {
                    x
                } else {
                    x.exp_m1().ln()
                }
            }
            Transformation::Logit => {
                let p = x.clamp(EPS, 1.0 - EPS);
                (p / (1.0 - p)).ln()
            }
        }
    }

    pub fn reverse(&self, x: f64) -> f64 {
        match self {
            Transformation::None => x,
            Transformation::Log => x.exp(),
            Transformation::Log1p => x.exp_m1(),
            Transformation::Softplus => {
                if x > 20.0 {
                    x
                } else {
                    x.exp().ln_1p()
                }
            }
            Transformation::Logit => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingMethod {
    /// Mean and standard deviation.
    Standard,
    /// Median and interquartile range.
    Robust,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalingOptions {
    pub method: ScalingMethod,
    pub center: bool,
    pub transformation: Transformation,
    /// Clamp de-normalized values at zero.
    pub coerce_positive: bool,
}

impl Default for ScalingOptions {
    fn default() -> Self {
        Self {
            method: ScalingMethod::Standard,
            center: true,
            transformation: Transformation::None,
            coerce_positive: false,
        }
    }
}

impl ScalingOptions {
    pub fn with_method(mut self, method: ScalingMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn with_coerce_positive(mut self, coerce_positive: bool) -> Self {
        self.coerce_positive = coerce_positive;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.coerce_positive
            && matches!(
                self.transformation,
                Transformation::Log | Transformation::Log1p
            )
        {
            return Err(DatasetError::InvalidConfig(
                "coerce_positive cannot be combined with a log transformation".to_string(),
            ));
        }
        Ok(())
    }

    /// Fits location and scale on already pre-transformed values.
    fn fit_norm(&self, transformed: &[f64]) -> Norm {
        if transformed.is_empty() {
            return Norm::IDENTITY;
        }
        let ca = Float64Chunked::from_slice("values".into(), transformed);
        let (center, scale) = match self.method {
            ScalingMethod::Standard if self.center => {
                (ca.mean().unwrap_or(0.0), ca.std(0).unwrap_or(1.0))
            }
            // spread around zero
            ScalingMethod::Standard => (0.0, (&ca * &ca).mean().unwrap_or(1.0).sqrt()),
            ScalingMethod::Robust => {
                let quantile = |q: f64| {
                    ca.quantile(q, QuantileMethod::Linear)
                        .unwrap_or(None)
                        .unwrap_or(0.0)
                };
                let center = if self.center { quantile(0.5) } else { 0.0 };
                (center, quantile(0.75) - quantile(0.25))
            }
        };
        Norm::new(center, scale)
    }

    fn forward(&self, x: f64, norm: &Norm) -> f64 {
        (self.transformation.forward(x) - norm.center) / norm.scale
    }

    fn reverse(&self, y: f64, norm: &Norm) -> f64 {
        let x = self.transformation.reverse(y * norm.scale + norm.center);
        if self.coerce_positive {
            x.max(0.0)
        } else {
            x
        }
    }
}

/// Location and scale such that `scaled = (pre_transform(x) - center) / scale`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Norm {
    pub center: f64,
    pub scale: f64,
}

impl Norm {
    pub const IDENTITY: Norm = Norm {
        center: 0.0,
        scale: 1.0,
    };

    fn new(center: f64, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > EPS {
            scale
        } else {
            1.0
        };
        Self { center, scale }
    }
}

/// Unfitted scaler choice for one continuous column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NormalizerKind {
    Identity,
    Standard(ScalingOptions),
    MinMax {
        lower: f64,
        upper: f64,
    },
    /// Location and scale per group of rows sharing the values of `groups`.
    Group {
        groups: Vec<String>,
        /// Combine per-column statistics instead of one joint key.
        scale_by_group: bool,
        options: ScalingOptions,
    },
    /// Fitted on the encoder segment of every window at read time.
    Encoder(ScalingOptions),
}

impl NormalizerKind {
    pub fn standard() -> Self {
        NormalizerKind::Standard(ScalingOptions::default())
    }

    pub fn min_max() -> Self {
        NormalizerKind::MinMax {
            lower: -1.0,
            upper: 1.0,
        }
    }

    pub fn group(groups: Vec<String>) -> Self {
        NormalizerKind::Group {
            groups,
            scale_by_group: false,
            options: ScalingOptions::default(),
        }
    }

    pub fn encoder() -> Self {
        NormalizerKind::Encoder(ScalingOptions::default())
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            NormalizerKind::Identity => Ok(()),
            NormalizerKind::Standard(options) | NormalizerKind::Encoder(options) => {
                options.validate()
            }
            NormalizerKind::Group { options, .. } => options.validate(),
            NormalizerKind::MinMax { lower, upper } => {
                if lower < upper {
                    Ok(())
                } else {
                    Err(DatasetError::InvalidConfig(format!(
                        "min-max range [{lower}, {upper}] is empty"
                    )))
                }
            }
        }
    }

    /// Columns whose values condition the scaler.
    pub fn group_columns(&self) -> &[String] {
        match self {
            NormalizerKind::Group { groups, .. } => groups,
            _ => &[],
        }
    }
}

/// Per-group statistics of a [`Normalizer::Group`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupNormalizer {
    groups: Vec<String>,
    scale_by_group: bool,
    options: ScalingOptions,
    global: Norm,
    // sorted by key
    joint: Vec<(Vec<Option<Category>>, Norm)>,
    per_column: Vec<Vec<(Option<Category>, Norm)>>,
}

impl GroupNormalizer {
    fn fit(
        groups: &[String],
        scale_by_group: bool,
        options: ScalingOptions,
        transformed: &[f64],
        keys: &[Vec<Option<Category>>],
    ) -> Self {
        let n_groups = groups.len();
        let global = options.fit_norm(transformed);

        let joint = if scale_by_group || n_groups == 0 {
            Vec::new()
        } else {
            fit_by_key(&options, transformed, keys.iter().cloned())
        };
        let per_column = if scale_by_group {
            (0..n_groups)
                .map(|j| fit_by_key(&options, transformed, keys.iter().map(|k| k[j].clone())))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            groups: groups.to_vec(),
            scale_by_group,
            options,
            global,
            joint,
            per_column,
        }
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Falls back to global statistics for groups never seen during fitting
    /// and for an empty key.
    pub fn norm(&self, key: &[Option<Category>]) -> Norm {
        if key.len() != self.groups.len() || key.is_empty() {
            return self.global;
        }
        if self.scale_by_group {
            if self.per_column.is_empty() {
                return self.global;
            }
            let norms: Vec<Norm> = self
                .per_column
                .iter()
                .zip(key.iter())
                .map(|(table, value)| {
                    table
                        .binary_search_by(|(k, _)| k.cmp(value))
                        .map(|pos| table[pos].1)
                        .unwrap_or(self.global)
                })
                .collect();
            let n = norms.len() as f64;
            let center = norms.iter().map(|n| n.center).sum::<f64>() / n;
            let scale = (norms.iter().map(|n| n.scale.ln()).sum::<f64>() / n).exp();
            Norm::new(center, scale)
        } else {
            self.joint
                .binary_search_by(|(k, _)| k.as_slice().cmp(key))
                .map(|pos| self.joint[pos].1)
                .unwrap_or(self.global)
        }
    }
}

fn fit_by_key<K, I>(options: &ScalingOptions, transformed: &[f64], keys: I) -> Vec<(K, Norm)>
where
    K: Ord + Clone,
    I: Iterator<Item = K>,
{
    let mut rows: Vec<(K, f64)> = keys.zip(transformed.iter().copied()).collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut norms = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let mut end = start;
        while end < rows.len() && rows[end].0 == rows[start].0 {
            end += 1;
        }
        let values: Vec<f64> = rows[start..end].iter().map(|(_, v)| *v).collect();
        norms.push((rows[start].0.clone(), options.fit_norm(&values)));
        start = end;
    }
    norms
}

/// Fitted scaler for one continuous column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Normalizer {
    Identity,
    Standard { options: ScalingOptions, norm: Norm },
    MinMax { norm: Norm },
    Group(GroupNormalizer),
    Encoder { options: ScalingOptions },
}

impl Normalizer {
    /// Fits the scaler. `keys` holds, per row, the values of the kind's group
    /// columns and is ignored by the other strategies.
    pub fn fit(kind: &NormalizerKind, values: &[f64], keys: &[Vec<Option<Category>>]) -> Result<Self> {
        kind.validate()?;
        let normalizer = match kind {
            NormalizerKind::Identity => Normalizer::Identity,
            NormalizerKind::Standard(options) => {
                let transformed: Vec<f64> = values
                    .iter()
                    .map(|x| options.transformation.forward(*x))
                    .collect();
                Normalizer::Standard {
                    options: *options,
                    norm: options.fit_norm(&transformed),
                }
            }
            NormalizerKind::MinMax { lower, upper } => {
                let ca = Float64Chunked::from_slice("values".into(), values);
                let norm = match (ca.min(), ca.max()) {
                    (Some(min), Some(max)) => {
                        let scale = Norm::new(0.0, (max - min) / (upper - lower)).scale;
                        Norm {
                            center: min - lower * scale,
                            scale,
                        }
                    }
                    _ => Norm::IDENTITY,
                };
                Normalizer::MinMax { norm }
            }
            NormalizerKind::Group {
                groups,
                scale_by_group,
                options,
            } => {
                let transformed: Vec<f64> = values
                    .iter()
                    .map(|x| options.transformation.forward(*x))
                    .collect();
                Normalizer::Group(GroupNormalizer::fit(
                    groups,
                    *scale_by_group && !groups.is_empty(),
                    *options,
                    &transformed,
                    keys,
                ))
            }
            NormalizerKind::Encoder(options) => Normalizer::Encoder { options: *options },
        };
        debug!(?normalizer, "fitted normalizer");
        Ok(normalizer)
    }

    /// Columns whose values select the parameters of a row.
    pub fn group_columns(&self) -> &[String] {
        match self {
            Normalizer::Group(group) => group.groups(),
            _ => &[],
        }
    }

    pub fn is_encoder(&self) -> bool {
        matches!(self, Normalizer::Encoder { .. })
    }

    fn options(&self) -> ScalingOptions {
        match self {
            Normalizer::Standard { options, .. } | Normalizer::Encoder { options } => *options,
            Normalizer::Group(group) => group.options,
            Normalizer::Identity | Normalizer::MinMax { .. } => ScalingOptions::default(),
        }
    }

    /// `(center, scale)` for a row with the given group key. Encoder normalizers
    /// have no global parameters, see [`Normalizer::fit_window`].
    pub fn get_parameters(&self, key: &[Option<Category>]) -> Option<Norm> {
        match self {
            Normalizer::Identity => Some(Norm::IDENTITY),
            Normalizer::Standard { norm, .. } | Normalizer::MinMax { norm } => Some(*norm),
            Normalizer::Group(group) => Some(group.norm(key)),
            Normalizer::Encoder { .. } => None,
        }
    }

    /// Fits an encoder normalizer over the raw values of one encoder segment.
    pub fn fit_window(&self, values: &[f64]) -> Norm {
        let options = self.options();
        let transformed: Vec<f64> = values
            .iter()
            .map(|x| options.transformation.forward(*x))
            .collect();
        options.fit_norm(&transformed)
    }

    pub fn transform_with(&self, x: f64, norm: &Norm) -> f64 {
        match self {
            Normalizer::Identity => x,
            Normalizer::MinMax { .. } => (x - norm.center) / norm.scale,
            _ => self.options().forward(x, norm),
        }
    }

    pub fn inverse_transform_with(&self, y: f64, norm: &Norm) -> f64 {
        match self {
            Normalizer::Identity => y,
            Normalizer::MinMax { .. } => y * norm.scale + norm.center,
            _ => self.options().reverse(y, norm),
        }
    }

    pub fn transform_one(&self, x: f64, key: &[Option<Category>]) -> f64 {
        match self.get_parameters(key) {
            Some(norm) => self.transform_with(x, &norm),
            None => x,
        }
    }

    pub fn inverse_transform_one(&self, y: f64, key: &[Option<Category>]) -> f64 {
        match self.get_parameters(key) {
            Some(norm) => self.inverse_transform_with(y, &norm),
            None => y,
        }
    }

    /// Scales a column row by row. Encoder normalizers leave values untouched.
    pub fn transform(&self, values: &[f64], keys: &[Vec<Option<Category>>]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(row, x)| {
                let key = keys.get(row).map(Vec::as_slice).unwrap_or(&[]);
                self.transform_one(*x, key)
            })
            .collect()
    }

    pub fn inverse_transform(&self, values: &[f64], keys: &[Vec<Option<Category>>]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(row, y)| {
                let key = keys.get(row).map(Vec::as_slice).unwrap_or(&[]);
                self.inverse_transform_one(*y, key)
            })
            .collect()
    }
}
