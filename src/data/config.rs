use std::collections::BTreeMap;

use burn::config::Config;

use crate::data::normalizers::NormalizerKind;
use crate::data::table::Value;
use crate::error::DatasetError;

pub const RELATIVE_TIME_IDX: &str = "relative_time_idx";
pub const ENCODER_LENGTH: &str = "encoder_length";

#[derive(Config, Debug)]
pub struct TimeSeriesDataSetConfig {
    /// Integer column with the time step of each row.
    pub time_idx: String,
    /// Continuous column to forecast.
    pub target: String,
    /// Columns that together identify one series.
    pub group_ids: Vec<String>,

    #[config(default = "None")]
    pub weight: Option<String>,

    #[config(default = 30)]
    pub max_encoder_length: usize,

    #[config(default = 0)]
    pub min_encoder_length: usize,

    /// First time index a prediction may start at. Defaults to the first time
    /// index of the fitted data.
    #[config(default = "None")]
    pub min_prediction_idx: Option<i64>,

    #[config(default = 1)]
    pub min_prediction_length: usize,

    #[config(default = 1)]
    pub max_prediction_length: usize,

    #[config(default = "Vec::new()")]
    pub static_categoricals: Vec<String>,

    #[config(default = "Vec::new()")]
    pub static_reals: Vec<String>,

    #[config(default = "Vec::new()")]
    pub time_varying_known_categoricals: Vec<String>,

    #[config(default = "Vec::new()")]
    pub time_varying_known_reals: Vec<String>,

    #[config(default = "Vec::new()")]
    pub time_varying_unknown_categoricals: Vec<String>,

    #[config(default = "Vec::new()")]
    pub time_varying_unknown_reals: Vec<String>,

    /// Categorical names standing for several columns that share one encoder.
    #[config(default = "BTreeMap::new()")]
    pub variable_groups: BTreeMap<String, Vec<String>>,

    /// Categoricals reset to the missing code when no history is visible.
    #[config(default = "Vec::new()")]
    pub dropout_categoricals: Vec<String>,

    /// Categoricals whose encoder reserves code 0 for unseen values.
    #[config(default = "Vec::new()")]
    pub categorical_add_nan: Vec<String>,

    /// Values written into reconstructed time steps instead of forward filling.
    #[config(default = "BTreeMap::new()")]
    pub constant_fill_strategy: BTreeMap<String, Value>,

    #[config(default = "BTreeMap::new()")]
    pub scalers: BTreeMap<String, NormalizerKind>,

    #[config(default = "NormalizerKind::standard()")]
    pub target_normalizer: NormalizerKind,

    #[config(default = true)]
    pub add_relative_time_idx: bool,

    #[config(default = false)]
    pub add_encoder_length: bool,

    /// Also index the shorter windows that end where no full window ends.
    #[config(default = false)]
    pub add_shortened_windows: bool,

    /// Beta distribution concentrations for length randomization.
    #[config(default = "Some((0.2, 0.05))")]
    pub randomize_length: Option<(f64, f64)>,

    #[config(default = false)]
    pub predict_mode: bool,
}

impl TimeSeriesDataSetConfig {
    /// Categorical names, variable groups unexpanded.
    pub fn categoricals(&self) -> Vec<String> {
        self.static_categoricals
            .iter()
            .chain(self.time_varying_known_categoricals.iter())
            .chain(self.time_varying_unknown_categoricals.iter())
            .cloned()
            .collect()
    }

    /// Categorical table columns, one per tensor column.
    pub fn flat_categoricals(&self) -> Vec<String> {
        self.categoricals()
            .into_iter()
            .flat_map(|name| match self.variable_groups.get(&name) {
                Some(columns) => columns.clone(),
                None => vec![name],
            })
            .collect()
    }

    /// Continuous feature names including derived features.
    pub fn reals(&self) -> Vec<String> {
        let mut reals: Vec<String> = self
            .static_reals
            .iter()
            .chain(self.time_varying_known_reals.iter())
            .cloned()
            .collect();
        if self.add_relative_time_idx {
            reals.push(RELATIVE_TIME_IDX.to_string());
        }
        if self.add_encoder_length {
            reals.push(ENCODER_LENGTH.to_string());
        }
        reals.extend(self.time_varying_unknown_reals.iter().cloned());
        reals
    }

    /// Reals read from the table, i.e. without derived features.
    pub fn table_reals(&self) -> Vec<String> {
        self.reals()
            .into_iter()
            .filter(|name| !is_derived(name))
            .collect()
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.min_prediction_length == 0 {
            return Err(DatasetError::InvalidConfig(
                "min_prediction_length must be larger than 0".to_string(),
            ));
        }
        if self.min_prediction_length > self.max_prediction_length {
            return Err(DatasetError::InvalidConfig(format!(
                "min_prediction_length {} exceeds max_prediction_length {}",
                self.min_prediction_length, self.max_prediction_length
            )));
        }
        if self.max_encoder_length == 0 || self.min_encoder_length > self.max_encoder_length {
            return Err(DatasetError::InvalidConfig(format!(
                "encoder lengths must satisfy 0 <= min ({}) <= max ({}) and max > 0",
                self.min_encoder_length, self.max_encoder_length
            )));
        }
        if self.group_ids.is_empty() {
            return Err(DatasetError::InvalidConfig(
                "at least one group id column is required".to_string(),
            ));
        }
        if self.time_varying_known_reals.contains(&self.target) {
            return Err(DatasetError::TargetIsKnownReal(self.target.clone()));
        }
        if let Some(weight) = &self.weight {
            if self.flat_categoricals().contains(weight) || self.table_reals().contains(weight) {
                return Err(DatasetError::WeightIsFeature(weight.clone()));
            }
        }
        if let Some((alpha, beta)) = self.randomize_length {
            if !(alpha > 0.0 && beta > 0.0) {
                return Err(DatasetError::InvalidConfig(format!(
                    "randomize_length concentrations must be positive, got ({alpha}, {beta})"
                )));
            }
        }

        let user_reals: Vec<&String> = self
            .static_reals
            .iter()
            .chain(self.time_varying_known_reals.iter())
            .chain(self.time_varying_unknown_reals.iter())
            .collect();
        let names = self
            .group_ids
            .iter()
            .chain([&self.time_idx, &self.target])
            .chain(self.weight.iter())
            .chain(user_reals.iter().copied())
            .chain(self.categoricals().iter())
            .chain(self.flat_categoricals().iter())
            .cloned()
            .collect::<Vec<String>>();
        if let Some(name) = names.iter().find(|name| !is_valid_name(name)) {
            return Err(DatasetError::ReservedName(name.clone()));
        }

        let categoricals = self.categoricals();
        if let Some(name) = self
            .dropout_categoricals
            .iter()
            .find(|name| !categoricals.contains(name))
        {
            return Err(DatasetError::InvalidConfig(format!(
                "dropout categorical `{name}` is not a categorical variable"
            )));
        }

        let reals = self.table_reals();
        let flat_categoricals = self.flat_categoricals();
        if let Some(name) = self.constant_fill_strategy.keys().find(|name| {
            !reals.contains(name) && !flat_categoricals.contains(name) && **name != self.target
        }) {
            return Err(DatasetError::InvalidConfig(format!(
                "constant fill column `{name}` is not a variable of the dataset"
            )));
        }

        self.target_normalizer.validate()?;
        for kind in self.scalers.values() {
            kind.validate()?;
        }
        Ok(())
    }
}

fn is_derived(name: &str) -> bool {
    name == RELATIVE_TIME_IDX || name == ENCODER_LENGTH
}

fn is_valid_name(name: &str) -> bool {
    !is_derived(name) && !name.starts_with("__") && !name.contains('.')
}
