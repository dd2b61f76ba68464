use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::batchitem::BatchItem;
use crate::data::config::{TimeSeriesDataSetConfig, ENCODER_LENGTH, RELATIVE_TIME_IDX};
use crate::data::encoders::NaNLabelEncoder;
use crate::data::index::{construct_index, group_ranges, IndexParams, WindowIndex, WindowIndexEntry};
use crate::data::item::{
    decoder_length, randomize_lengths, relative_time_idx, scaled_encoder_length, EncodedFill,
    WindowData, WindowItem,
};
use crate::data::loader::WindowDataLoader;
use crate::data::normalizers::{Norm, Normalizer, NormalizerKind};
use crate::data::overwrite::{Overwrite, OverwriteColumns, OverwriteTarget};
use crate::data::sampler::RandomBatchSampler;
use crate::data::store::TensorStore;
use crate::data::table::{Category, PanelTable, Value, ROW_INDEX};
use crate::error::{DatasetError, Result};

static IDENTITY: Normalizer = Normalizer::Identity;

/// Encoders and scalers fitted on the training table. Derived datasets reuse
/// them so that codes and scales agree with the training data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FittedState {
    /// Keyed by categorical name, variable groups share one encoder.
    pub categorical_encoders: BTreeMap<String, NaNLabelEncoder>,
    pub group_encoders: BTreeMap<String, NaNLabelEncoder>,
    pub scalers: BTreeMap<String, Normalizer>,
    pub target_normalizer: Option<Normalizer>,
}

/// Group ids and time span of one window, decoded to table values.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedIndexEntry {
    pub groups: Vec<Option<Category>>,
    pub time_idx_first: i64,
    pub time_idx_last: i64,
    pub time_idx_first_prediction: i64,
}

/// Series and first predicted time step of one window in a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionIndex {
    pub groups: Vec<Option<Category>>,
    pub time_idx: i64,
}

/// Windowed view over a panel of time series.
///
/// Construction sorts and encodes the table once into a [`TensorStore`] and
/// enumerates every admissible window into a [`WindowIndex`]. Reading a window
/// copies its rows out of the store, reconstructs missing time steps, and may
/// randomly shorten it.
#[derive(Clone, Debug)]
pub struct TimeSeriesDataSet {
    config: TimeSeriesDataSetConfig,
    min_prediction_idx: i64,
    state: FittedState,
    fill: EncodedFill,
    index: WindowIndex,
    store: TensorStore,
    excluded_groups: Vec<Vec<Option<Category>>>,
    reals: Vec<String>,
    flat_categoricals: Vec<String>,
    overwrite: Option<Overwrite>,
}

#[derive(Serialize, Deserialize)]
struct PersistedDataSet {
    config: String,
    min_prediction_idx: i64,
    state: FittedState,
    fill: EncodedFill,
    index: WindowIndex,
    store: TensorStore,
    excluded_groups: Vec<Vec<Option<Category>>>,
}

impl TimeSeriesDataSet {
    /// Fits encoders and scalers on `data` and indexes its windows.
    pub fn new(data: &PanelTable, config: TimeSeriesDataSetConfig) -> Result<Self> {
        Self::build(data, config, None)
    }

    /// Dataset over new data sharing the configuration and fitted state of
    /// `self`. With `predict`, only the last window of each series is kept and
    /// decoders span `max_prediction_length`; this needs `stop_randomization`.
    pub fn from_dataset(
        &self,
        data: &PanelTable,
        predict: bool,
        stop_randomization: bool,
    ) -> Result<Self> {
        self.from_dataset_with_config(data, self.config.clone(), predict, stop_randomization)
    }

    /// Like [`TimeSeriesDataSet::from_dataset`] with configuration overrides.
    /// Variables not fitted on the source dataset are fitted on `data`.
    pub fn from_dataset_with_config(
        &self,
        data: &PanelTable,
        config: TimeSeriesDataSetConfig,
        predict: bool,
        stop_randomization: bool,
    ) -> Result<Self> {
        if predict && !stop_randomization {
            return Err(DatasetError::InvalidConfig(
                "prediction datasets require stop_randomization".to_string(),
            ));
        }
        let min_prediction_idx = config.min_prediction_idx.unwrap_or(self.min_prediction_idx);
        let max_prediction_length = config.max_prediction_length;
        let mut config = config.with_min_prediction_idx(Some(min_prediction_idx));
        if stop_randomization {
            config = config.with_randomize_length(None);
        }
        if predict {
            config = config
                .with_min_prediction_length(max_prediction_length)
                .with_predict_mode(true);
        }
        Self::build(data, config, Some(&self.state))
    }

    fn build(
        data: &PanelTable,
        config: TimeSeriesDataSetConfig,
        fitted: Option<&FittedState>,
    ) -> Result<Self> {
        config.validate()?;
        let reals = config.reals();
        let table_reals = config.table_reals();
        let flat_categoricals = config.flat_categoricals();

        let mut required: Vec<&String> = config
            .group_ids
            .iter()
            .chain([&config.time_idx, &config.target])
            .chain(config.weight.iter())
            .chain(table_reals.iter())
            .chain(flat_categoricals.iter())
            .chain(config.target_normalizer.group_columns().iter())
            .collect();
        for name in table_reals.iter() {
            if let Some(kind) = config.scalers.get(name) {
                required.extend(kind.group_columns().iter());
            }
        }
        for name in required {
            data.series(name)?;
        }
        data.integers(&config.time_idx)?;

        // sort by series, then time
        let sort_columns: Vec<String> = config
            .group_ids
            .iter()
            .chain([&config.time_idx])
            .cloned()
            .collect();
        let data = data.sorted(&sort_columns)?;
        let time = data.integers(&config.time_idx)?;
        let keys = row_keys(&data, &config.group_ids)?;
        if let Some(row) =
            (1..data.len()).find(|row| keys[*row] == keys[row - 1] && time[*row] == time[row - 1])
        {
            let input_rows = data.integers(ROW_INDEX)?;
            return Err(DatasetError::DuplicateKey(input_rows[row] as usize));
        }
        let n_rows = data.len();

        let mut series = Vec::with_capacity(n_rows);
        let mut current = 0;
        for row in 0..n_rows {
            if row > 0 && keys[row] != keys[row - 1] {
                current += 1;
            }
            series.push(current);
        }
        let ranges = group_ranges(&series);

        let min_prediction_idx = config
            .min_prediction_idx
            .or_else(|| time.iter().copied().min())
            .unwrap_or(0);

        let mut state = fitted.cloned().unwrap_or_default();
        fit_encoders(&data, &config, &mut state)?;
        fit_scalers(&data, &config, &table_reals, &mut state)?;
        let target_normalizer = state.target_normalizer.as_ref().unwrap_or(&IDENTITY);

        let mut continuous = Vec::with_capacity(reals.len());
        for name in reals.iter() {
            if name == RELATIVE_TIME_IDX || name == ENCODER_LENGTH {
                continuous.push(vec![0.0f32; n_rows]);
                continue;
            }
            let scaler = real_scaler(&state, &config, name);
            let values = data.dense_reals(name)?;
            let scaled = if scaler.is_encoder() {
                values
            } else {
                scaler.transform(&values, &row_keys(&data, scaler.group_columns())?)
            };
            continuous.push(scaled.into_iter().map(|v| v as f32).collect());
        }

        let mut categorical = Vec::with_capacity(flat_categoricals.len());
        for name in flat_categoricals.iter() {
            let encoder = categorical_encoder(&state, &config, name)?;
            categorical.push(encoder.transform(&data.categories(name)?)?);
        }

        let mut groups = Vec::with_capacity(config.group_ids.len());
        for name in config.group_ids.iter() {
            let encoder = state
                .group_encoders
                .get(name)
                .ok_or_else(|| DatasetError::MissingColumn(name.clone()))?;
            groups.push(encoder.transform(&data.categories(name)?)?);
        }

        let target = data.dense_reals(&config.target)?;
        let target_keys = row_keys(&data, target_normalizer.group_columns())?;
        let target_scale: Vec<[f32; 2]> = target_keys
            .iter()
            .map(|key| match target_normalizer.get_parameters(key) {
                Some(norm) => [norm.center as f32, norm.scale as f32],
                None => [0.0, 1.0],
            })
            .collect();
        let weight = match &config.weight {
            Some(name) => Some(
                data.dense_reals(name)?
                    .into_iter()
                    .map(|v| v as f32)
                    .collect(),
            ),
            None => None,
        };

        let fill = encode_fill(&config, &state, &reals, &flat_categoricals)?;

        let params = IndexParams {
            min_encoder_length: config.min_encoder_length,
            max_encoder_length: config.max_encoder_length,
            min_prediction_length: config.min_prediction_length,
            max_prediction_length: config.max_prediction_length,
            min_prediction_idx,
            predict_mode: config.predict_mode,
            add_shortened_windows: config.add_shortened_windows,
        };
        let index = construct_index(&time, &ranges, &params);

        let group_key = |group: &usize| keys[ranges[*group].start].clone();
        if !index.short_groups.is_empty() {
            let first: Vec<_> = index.short_groups.iter().take(10).map(group_key).collect();
            warn!(
                count = index.short_groups.len(),
                ?first,
                "min_encoder_length + min_prediction_length exceeds the time span of some series"
            );
        }
        let excluded_groups: Vec<Vec<Option<Category>>> =
            index.excluded_groups.iter().map(group_key).collect();
        if !excluded_groups.is_empty() {
            let first: Vec<_> = excluded_groups.iter().take(10).collect();
            warn!(
                count = excluded_groups.len(),
                ?first,
                "some series have no admissible window and are excluded"
            );
        }

        let store = TensorStore::new(
            &continuous,
            &categorical,
            &groups,
            &target_scale,
            time,
            target.into_iter().map(|v| v as f32).collect(),
            weight,
        );
        info!(
            rows = n_rows,
            series = ranges.len(),
            windows = index.entries.len(),
            "constructed timeseries dataset"
        );

        Ok(Self {
            config,
            min_prediction_idx,
            state,
            fill,
            index,
            store,
            excluded_groups,
            reals,
            flat_categoricals,
            overwrite: None,
        })
    }

    pub fn len(&self) -> usize {
        self.index.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.entries.is_empty()
    }

    pub fn config(&self) -> &TimeSeriesDataSetConfig {
        &self.config
    }

    pub fn min_prediction_idx(&self) -> i64 {
        self.min_prediction_idx
    }

    pub fn fitted_state(&self) -> &FittedState {
        &self.state
    }

    pub fn index(&self) -> &[WindowIndexEntry] {
        &self.index.entries
    }

    pub fn store(&self) -> &TensorStore {
        &self.store
    }

    /// Group keys of the series that have no admissible window.
    pub fn excluded_groups(&self) -> &[Vec<Option<Category>>] {
        &self.excluded_groups
    }

    /// Continuous feature names in tensor column order.
    pub fn reals(&self) -> &[String] {
        &self.reals
    }

    /// Categorical column names in tensor column order.
    pub fn flat_categoricals(&self) -> &[String] {
        &self.flat_categoricals
    }

    pub fn target_normalizer(&self) -> &Normalizer {
        self.state.target_normalizer.as_ref().unwrap_or(&IDENTITY)
    }

    /// Number of codes per categorical, variable groups counted once.
    pub fn embedding_cardinalities(&self) -> BTreeMap<String, usize> {
        self.state
            .categorical_encoders
            .iter()
            .filter(|(name, _)| self.config.categoricals().contains(name))
            .map(|(name, encoder)| (name.clone(), encoder.cardinality()))
            .collect()
    }

    /// Window `idx` at full length with missing time steps reconstructed,
    /// together with its decoder length.
    fn full_window(&self, idx: usize) -> Result<(&WindowIndexEntry, WindowData, usize)> {
        let config = &self.config;
        let entry = self.index.entries.get(idx).ok_or(DatasetError::OutOfRange {
            index: idx,
            len: self.len(),
        })?;

        let mut window = self.store.window(entry.index_start, entry.index_end);
        if window.len() < entry.sequence_length {
            let synthetic = window.fill_gaps();
            window.apply_fill(&synthetic, &self.fill);
            self.rescale_time_idx(&mut window, &synthetic);
        }
        if window.len() != entry.sequence_length {
            return Err(DatasetError::IncompleteWindow {
                index: idx,
                expected: entry.sequence_length,
                actual: window.len(),
            });
        }

        let sequence_length = window.len();
        let decoder = decoder_length(
            window.time[sequence_length - 1],
            self.min_prediction_idx,
            config.max_prediction_length,
            sequence_length,
            config.min_encoder_length,
        );
        if decoder < config.min_prediction_length as i64 {
            return Err(DatasetError::LengthViolation {
                index: idx,
                decoder_length: decoder,
                min_prediction_length: config.min_prediction_length,
            });
        }
        Ok((entry, window, decoder as usize))
    }

    /// Reads window `idx`, drawing random lengths from `rng`.
    pub fn get_with_rng<R: Rng + ?Sized>(&self, idx: usize, rng: &mut R) -> Result<WindowItem> {
        let config = &self.config;
        let (entry, mut window, mut decoder_length) = self.full_window(idx)?;
        let sequence_length = window.len();
        let mut encoder_length = sequence_length - decoder_length;

        if let Some(concentrations) = config.randomize_length {
            let (new_encoder, new_decoder) = randomize_lengths(
                rng,
                concentrations,
                encoder_length,
                decoder_length,
                config.min_encoder_length,
                config.min_prediction_length,
            )?;
            if new_encoder + new_decoder < sequence_length {
                window.truncate(encoder_length - new_encoder..encoder_length + new_decoder);
                encoder_length = new_encoder;
                decoder_length = new_decoder;
            }
            if encoder_length == 0 {
                for col in self.dropout_columns() {
                    window.categorical.column_mut(col).fill(0);
                }
            }
        }

        if let Some(overwrite) = &self.overwrite {
            overwrite.apply(&mut window, encoder_length);
        }

        for (col, name) in self.reals.iter().enumerate() {
            if name == RELATIVE_TIME_IDX {
                let values = relative_time_idx(encoder_length, decoder_length, config.max_encoder_length);
                for (row, value) in values.into_iter().enumerate() {
                    window.continuous[[row, col]] = value;
                }
            } else if name == ENCODER_LENGTH {
                window
                    .continuous
                    .column_mut(col)
                    .fill(scaled_encoder_length(encoder_length, config.max_encoder_length));
            } else {
                let scaler = real_scaler(&self.state, config, name);
                if scaler.is_encoder() {
                    let raw: Vec<f64> = window.continuous.column(col).iter().map(|v| *v as f64).collect();
                    let norm = scaler.fit_window(&raw[..encoder_length]);
                    for (row, value) in raw.iter().enumerate() {
                        window.continuous[[row, col]] = scaler.transform_with(*value, &norm) as f32;
                    }
                }
            }
        }

        let target_normalizer = self.target_normalizer();
        let target_scale = if target_normalizer.is_encoder() {
            let raw: Vec<f64> = window.target[..encoder_length].iter().map(|v| *v as f64).collect();
            let norm = target_normalizer.fit_window(&raw);
            [norm.center as f32, norm.scale as f32]
        } else {
            self.store.row_target_scale(entry.index_start)
        };

        let WindowData {
            continuous,
            categorical,
            time,
            target,
            weight,
        } = window;
        Ok(WindowItem {
            x_cat: categorical,
            x_cont: continuous,
            encoder_length,
            decoder_length,
            encoder_target: target[..encoder_length].to_vec(),
            decoder_target: target[encoder_length..].to_vec(),
            weight: weight.map(|w| w[encoder_length..].to_vec()),
            target_scale,
            groups: self.store.group_codes(entry.index_start),
            time_idx: time,
        })
    }

    // Inserted rows repeat the previous time index; write their own instead.
    fn rescale_time_idx(&self, window: &mut WindowData, synthetic: &[bool]) {
        let Some(col) = self.reals.iter().position(|name| *name == self.config.time_idx) else {
            return;
        };
        let scaler = real_scaler(&self.state, &self.config, &self.config.time_idx);
        for (row, _) in synthetic.iter().enumerate().filter(|(_, s)| **s) {
            let time = window.time[row] as f64;
            window.continuous[[row, col]] = if scaler.is_encoder() {
                time as f32
            } else {
                scaler.transform_one(time, &[]) as f32
            };
        }
    }

    fn dropout_columns(&self) -> Vec<usize> {
        let columns: Vec<String> = self
            .config
            .dropout_categoricals
            .iter()
            .flat_map(|name| match self.config.variable_groups.get(name) {
                Some(columns) => columns.clone(),
                None => vec![name.clone()],
            })
            .collect();
        self.flat_categoricals
            .iter()
            .enumerate()
            .filter(|(_, name)| columns.contains(name))
            .map(|(col, _)| col)
            .collect()
    }

    /// Replaces `variable` in every window read from now on. The store is not
    /// modified. Not meant to be changed while batches are being produced.
    pub fn set_overwrite_values(
        &mut self,
        value: Value,
        variable: &str,
        target: OverwriteTarget,
    ) -> Result<()> {
        let columns = if let Some(col) = self
            .reals
            .iter()
            .position(|name| name == variable && name != RELATIVE_TIME_IDX && name != ENCODER_LENGTH)
        {
            let raw = value.as_f64().ok_or_else(|| {
                DatasetError::InvalidConfig(format!("overwrite of `{variable}` needs a number"))
            })?;
            let scaler = real_scaler(&self.state, &self.config, variable);
            let encoded = if scaler.is_encoder() {
                raw
            } else {
                scaler.transform_one(raw, &[])
            };
            OverwriteColumns::Continuous(col, encoded as f32)
        } else {
            let columns: Vec<String> = match self.config.variable_groups.get(variable) {
                Some(columns) => columns.clone(),
                None => vec![variable.to_string()],
            };
            let cols: Vec<usize> = self
                .flat_categoricals
                .iter()
                .enumerate()
                .filter(|(_, name)| columns.contains(name))
                .map(|(col, _)| col)
                .collect();
            if cols.is_empty() {
                return Err(DatasetError::InvalidConfig(format!(
                    "`{variable}` is not a feature of the dataset"
                )));
            }
            let encoder = categorical_encoder(&self.state, &self.config, &columns[0])?;
            OverwriteColumns::Categorical(cols, encoder.transform_one(&value.as_category())?)
        };
        debug!(variable, ?columns, ?target, "set overwrite values");
        self.overwrite = Some(Overwrite { columns, target });
        Ok(())
    }

    pub fn reset_overwrite_values(&mut self) {
        self.overwrite = None;
    }

    /// Time index of the first decoder step of every window at full length.
    pub fn decoder_start_times(&self) -> Vec<i64> {
        self.index
            .entries
            .iter()
            .map(|entry| {
                let decoder = decoder_length(
                    entry.last_time(),
                    self.min_prediction_idx,
                    self.config.max_prediction_length,
                    entry.sequence_length,
                    self.config.min_encoder_length,
                );
                entry.time + entry.sequence_length as i64 - decoder
            })
            .collect()
    }

    fn decode_groups(&self, codes: &[i64]) -> Result<Vec<Option<Category>>> {
        self.config
            .group_ids
            .iter()
            .zip(codes.iter())
            .map(|(name, code)| {
                self.state
                    .group_encoders
                    .get(name)
                    .ok_or_else(|| DatasetError::MissingColumn(name.clone()))?
                    .inverse_transform_one(*code)
            })
            .collect()
    }

    /// Window index with group ids decoded to table values.
    pub fn decoded_index(&self) -> Result<Vec<DecodedIndexEntry>> {
        self.index
            .entries
            .iter()
            .zip(self.decoder_start_times())
            .map(|(entry, first_prediction)| {
                Ok(DecodedIndexEntry {
                    groups: self.decode_groups(&self.store.group_codes(entry.index_start))?,
                    time_idx_first: entry.time,
                    time_idx_last: entry.last_time(),
                    time_idx_first_prediction: first_prediction,
                })
            })
            .collect()
    }

    /// Series and first predicted time step of every window of a batch.
    pub fn x_to_index<B: Backend>(&self, batch: &BatchItem<B>) -> Result<Vec<PredictionIndex>> {
        let [n, n_groups] = batch.groups.dims();
        let [_, steps] = batch.decoder_time_idx.dims();
        let groups = batch.groups.clone().into_data().convert::<i64>().value;
        let times = batch.decoder_time_idx.clone().into_data().convert::<i64>().value;
        (0..n)
            .map(|i| {
                Ok(PredictionIndex {
                    groups: self.decode_groups(&groups[i * n_groups..(i + 1) * n_groups])?,
                    time_idx: times.get(i * steps).copied().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Target scale of every window at full length.
    pub fn scales(&self) -> Result<Vec<[f32; 2]>> {
        let target_normalizer = self.target_normalizer();
        (0..self.len())
            .map(|idx| {
                if target_normalizer.is_encoder() {
                    let (_, window, decoder_length) = self.full_window(idx)?;
                    let encoder_length = window.len() - decoder_length;
                    let raw: Vec<f64> = window.target[..encoder_length]
                        .iter()
                        .map(|v| *v as f64)
                        .collect();
                    let Norm { center, scale } = target_normalizer.fit_window(&raw);
                    Ok([center as f32, scale as f32])
                } else {
                    Ok(self.store.row_target_scale(self.index.entries[idx].index_start))
                }
            })
            .collect()
    }

    pub fn to_dataloader<B: Backend>(
        self: Arc<Self>,
        train: bool,
        batch_size: usize,
        device: B::Device,
        seed: u64,
    ) -> Result<WindowDataLoader<B, RandomBatchSampler>> {
        let sampler = RandomBatchSampler::new(batch_size, train, train, seed)?;
        Ok(WindowDataLoader::new(self, sampler, device, seed))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let persisted = PersistedDataSet {
            config: serde_json::to_string(&self.config)?,
            min_prediction_idx: self.min_prediction_idx,
            state: self.state.clone(),
            fill: self.fill.clone(),
            index: self.index.clone(),
            store: self.store.clone(),
            excluded_groups: self.excluded_groups.clone(),
        };
        Ok(bincode::serialize(&persisted)?)
    }

    /// Restores a dataset written by [`TimeSeriesDataSet::to_bytes`]. Overwrite
    /// values are not persisted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let persisted: PersistedDataSet = bincode::deserialize(bytes)?;
        let config: TimeSeriesDataSetConfig = serde_json::from_str(&persisted.config)?;
        Ok(Self {
            reals: config.reals(),
            flat_categoricals: config.flat_categoricals(),
            config,
            min_prediction_idx: persisted.min_prediction_idx,
            state: persisted.state,
            fill: persisted.fill,
            index: persisted.index,
            store: persisted.store,
            excluded_groups: persisted.excluded_groups,
            overwrite: None,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}

impl Dataset<WindowItem> for TimeSeriesDataSet {
    /// Reads window `index` with a thread local RNG.
    ///
    /// # Panics
    ///
    /// Panics if the window cannot be read, e.g. on a decoder shorter than
    /// `min_prediction_length`. Use [`TimeSeriesDataSet::get_with_rng`] to
    /// handle these errors.
    fn get(&self, index: usize) -> Option<WindowItem> {
        if index >= self.len() {
            return None;
        }
        match self.get_with_rng(index, &mut rand::thread_rng()) {
            Ok(item) => Some(item),
            Err(err) => panic!("failed to read window {index}: {err}"),
        }
    }

    fn len(&self) -> usize {
        self.index.entries.len()
    }
}

fn row_keys(data: &PanelTable, columns: &[String]) -> Result<Vec<Vec<Option<Category>>>> {
    let mut keys = vec![Vec::with_capacity(columns.len()); data.len()];
    for name in columns {
        let values = data.categories(name)?;
        for (key, value) in keys.iter_mut().zip(values) {
            key.push(value);
        }
    }
    Ok(keys)
}

fn fit_encoders(
    data: &PanelTable,
    config: &TimeSeriesDataSetConfig,
    state: &mut FittedState,
) -> Result<()> {
    for name in config.categoricals() {
        if state.categorical_encoders.contains_key(&name) {
            continue;
        }
        let columns = match config.variable_groups.get(&name) {
            Some(columns) => columns.clone(),
            None => vec![name.clone()],
        };
        let mut values = Vec::new();
        for column in columns.iter() {
            values.extend(data.categories(column)?);
        }
        let add_nan = config.dropout_categoricals.contains(&name)
            || config.categorical_add_nan.contains(&name);
        let encoder = NaNLabelEncoder::new(name.clone(), add_nan).fit(&values);
        state.categorical_encoders.insert(name, encoder);
    }

    for name in config.group_ids.iter() {
        if state.group_encoders.contains_key(name) {
            continue;
        }
        let encoder = match state.categorical_encoders.get(name) {
            Some(encoder) => encoder.clone(),
            None => {
                let values = data.categories(name)?;
                NaNLabelEncoder::new(name.clone(), true).fit(&values)
            }
        };
        state.group_encoders.insert(name.clone(), encoder);
    }
    Ok(())
}

fn fit_scalers(
    data: &PanelTable,
    config: &TimeSeriesDataSetConfig,
    table_reals: &[String],
    state: &mut FittedState,
) -> Result<()> {
    if state.target_normalizer.is_none() {
        let kind = &config.target_normalizer;
        let values = data.dense_reals(&config.target)?;
        let keys = row_keys(data, kind.group_columns())?;
        state.target_normalizer = Some(Normalizer::fit(kind, &values, &keys)?);
    }

    for name in table_reals.iter() {
        if *name == config.target || state.scalers.contains_key(name) {
            continue;
        }
        let kind = match config.scalers.get(name) {
            Some(kind) => kind.clone(),
            None if *name == config.time_idx => NormalizerKind::min_max(),
            None => NormalizerKind::standard(),
        };
        let values = data.dense_reals(name)?;
        let keys = row_keys(data, kind.group_columns())?;
        state
            .scalers
            .insert(name.clone(), Normalizer::fit(&kind, &values, &keys)?);
    }
    Ok(())
}

// The target always uses the target normalizer, also as a feature.
fn real_scaler<'a>(
    state: &'a FittedState,
    config: &TimeSeriesDataSetConfig,
    name: &str,
) -> &'a Normalizer {
    if name == config.target {
        state.target_normalizer.as_ref().unwrap_or(&IDENTITY)
    } else {
        state.scalers.get(name).unwrap_or(&IDENTITY)
    }
}

fn categorical_encoder<'a>(
    state: &'a FittedState,
    config: &TimeSeriesDataSetConfig,
    column: &str,
) -> Result<&'a NaNLabelEncoder> {
    let name = config
        .variable_groups
        .iter()
        .find(|(_, columns)| columns.iter().any(|c| c == column))
        .map(|(name, _)| name.as_str())
        .unwrap_or(column);
    state
        .categorical_encoders
        .get(name)
        .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
}

fn encode_fill(
    config: &TimeSeriesDataSetConfig,
    state: &FittedState,
    reals: &[String],
    flat_categoricals: &[String],
) -> Result<EncodedFill> {
    let mut fill = EncodedFill::default();
    for (name, value) in config.constant_fill_strategy.iter() {
        let number = || {
            value.as_f64().ok_or_else(|| {
                DatasetError::InvalidConfig(format!("fill value of `{name}` must be a number"))
            })
        };
        if *name == config.target {
            fill.target = Some(number()? as f32);
        }
        if let Some(col) = reals.iter().position(|real| real == name) {
            let raw = number()?;
            let scaler = real_scaler(state, config, name);
            let encoded = if scaler.is_encoder() {
                raw
            } else {
                scaler.transform_one(raw, &[])
            };
            fill.continuous.push((col, encoded as f32));
        }
        if let Some(col) = flat_categoricals.iter().position(|c| c == name) {
            let encoder = categorical_encoder(state, config, name)?;
            fill.categorical
                .push((col, encoder.transform_one(&value.as_category())?));
        }
    }
    Ok(fill)
}
