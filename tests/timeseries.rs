mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use burn::backend::NdArray;
use burn::data::dataset::Dataset;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use common::{base_config, rows_equal, sales_table};
use tsdataset::{
    BatchItem, Category, DatasetError, NormalizerKind, OverwriteTarget,
    ScalingOptions, TimeSeriesDataSet, TimeSeriesDataSetConfig, TimeSynchronizedBatchSampler,
    Transformation, Value, WindowDataLoader,
};

type B = NdArray<f32>;

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn fixture_config() -> TimeSeriesDataSetConfig {
    base_config()
        .with_static_categoricals(strings(&["agency", "sku"]))
        .with_time_varying_known_categoricals(strings(&["month"]))
        .with_time_varying_known_reals(strings(&["time_idx", "price_regular"]))
        .with_time_varying_unknown_reals(strings(&["volume"]))
        .with_min_encoder_length(1)
}

fn batches(dataset: TimeSeriesDataSet, train: bool, batch_size: usize) -> Vec<BatchItem<B>> {
    let mut loader = Arc::new(dataset)
        .to_dataloader::<B>(train, batch_size, Default::default(), 42)
        .unwrap();
    loader.iter().map(|batch| batch.unwrap()).collect()
}

fn first_batch(dataset: TimeSeriesDataSet, train: bool) -> BatchItem<B> {
    batches(dataset, train, 16).into_iter().next().unwrap()
}

fn fields(batch: &BatchItem<B>) -> Vec<(&'static str, Vec<f32>)> {
    let mut fields = vec![
        ("encoder_cat", batch.encoder_cat.clone().into_data().convert::<f32>().value),
        ("encoder_cont", batch.encoder_cont.clone().into_data().value),
        ("encoder_target", batch.encoder_target.clone().into_data().value),
        ("encoder_lengths", batch.encoder_lengths.clone().into_data().convert::<f32>().value),
        ("decoder_cat", batch.decoder_cat.clone().into_data().convert::<f32>().value),
        ("decoder_cont", batch.decoder_cont.clone().into_data().value),
        ("decoder_target", batch.decoder_target.clone().into_data().value),
        ("decoder_lengths", batch.decoder_lengths.clone().into_data().convert::<f32>().value),
        ("decoder_time_idx", batch.decoder_time_idx.clone().into_data().convert::<f32>().value),
        ("target_scale", batch.target_scale.clone().into_data().value),
        ("groups", batch.groups.clone().into_data().convert::<f32>().value),
    ];
    if let Some(weight) = &batch.weight {
        fields.push(("weight", weight.clone().into_data().value));
    }
    fields
}

fn check_batch(dataset: &TimeSeriesDataSet, batch: &BatchItem<B>) {
    assert_eq!(batch.encoder_cont.dims()[2], dataset.reals().len());
    assert_eq!(batch.decoder_cat.dims()[2], dataset.flat_categoricals().len());
    assert_eq!(batch.groups.dims()[1], dataset.config().group_ids.len());
    for (name, values) in fields(batch) {
        assert!(values.iter().all(|v| v.is_finite()), "{name} has non-finite values");
    }
    let decoder_lengths = batch.decoder_lengths.clone().into_data().convert::<i64>().value;
    let max_prediction_length = dataset.config().max_prediction_length as i64;
    assert!(decoder_lengths
        .iter()
        .all(|length| (1..=max_prediction_length).contains(length)));
}

#[test]
fn test_dataset_variants_produce_finite_batches() {
    let table = sales_table(3, 3, 24);
    let mut special_days = BTreeMap::new();
    special_days.insert("special_days".to_string(), strings(&["easter_day", "christmas"]));
    let mut scalers = BTreeMap::new();
    scalers.insert("time_idx".to_string(), NormalizerKind::group(Vec::new()));
    scalers.insert("price_regular".to_string(), NormalizerKind::standard());

    let variants = vec![
        base_config(),
        base_config().with_add_encoder_length(true),
        base_config().with_add_relative_time_idx(false),
        base_config().with_weight(Some("discount".to_string())),
        base_config()
            .with_scalers(scalers)
            .with_time_varying_known_categoricals(strings(&["month"]))
            .with_time_varying_known_reals(strings(&["time_idx", "price_regular"])),
        base_config()
            .with_dropout_categoricals(strings(&["month"]))
            .with_time_varying_known_categoricals(strings(&["month"])),
        base_config()
            .with_variable_groups(special_days)
            .with_time_varying_known_categoricals(strings(&["special_days", "month"])),
        base_config().with_target_normalizer(NormalizerKind::Identity),
        base_config().with_target_normalizer(NormalizerKind::Group {
            groups: strings(&["agency", "sku"]),
            scale_by_group: true,
            options: ScalingOptions::default().with_transformation(Transformation::Log1p),
        }),
        fixture_config().with_add_shortened_windows(true),
    ];

    for config in variants {
        let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
        assert!(!dataset.is_empty());
        let batch = first_batch(dataset.clone(), true);
        check_batch(&dataset, &batch);
    }
}

#[test]
fn test_missing_time_steps_are_reconstructed() {
    let table = sales_table(2, 2, 24);
    let sample: BooleanChunked = (0..table.len()).map(|row| (row * 37 + 11) % 10 < 6).collect();
    let table = table.filter(&sample).unwrap();
    let mut fill = BTreeMap::new();
    fill.insert("volume".to_string(), Value::Float(0.0));
    let config = fixture_config()
        .with_min_encoder_length(0)
        .with_min_prediction_length(1)
        .with_constant_fill_strategy(fill)
        .with_randomize_length(None);
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
    let time_col = dataset
        .reals()
        .iter()
        .position(|name| name == "time_idx")
        .unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    for idx in 0..dataset.len() {
        let item = dataset.get_with_rng(idx, &mut rng).unwrap();
        assert_eq!(item.time_idx.len(), item.len());
        assert!(item.time_idx.windows(2).all(|pair| pair[1] == pair[0] + 1));
        let scaled_time = item.x_cont.column(time_col).to_vec();
        assert!(scaled_time.windows(2).all(|pair| pair[1] > pair[0]));
    }
    check_batch(&dataset, &first_batch(dataset.clone(), true));
}

#[test]
fn test_weight_is_not_a_feature() {
    let table = sales_table(2, 2, 16);
    let config = fixture_config().with_weight(Some("discount".to_string()));
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
    assert!(!dataset.reals().iter().any(|name| name == "discount"));

    let batch = first_batch(dataset, true);
    let weight = batch.weight.unwrap();
    assert_eq!(weight.dims(), batch.decoder_target.dims());
}

#[test]
fn test_from_dataset_equivalence() {
    let table = sales_table(2, 3, 24);
    let max_time = 23;
    let time = table.series("time_idx").unwrap();
    let training_table = table.filter(&time.lt(max_time - 1).unwrap()).unwrap();
    let config = base_config()
        .with_time_varying_known_reals(strings(&["price_regular", "time_idx"]))
        .with_static_categoricals(strings(&["agency"]))
        .with_max_encoder_length(3)
        .with_max_prediction_length(2)
        .with_min_prediction_length(1)
        .with_min_encoder_length(0)
        .with_randomize_length(None)
        .with_add_encoder_length(true);
    let training = TimeSeriesDataSet::new(&training_table, config).unwrap();

    let validation1 = training.from_dataset(&table, true, true).unwrap();
    let recent = table.filter(&time.gt(2).unwrap()).unwrap();
    let validation2 = training.from_dataset(&recent, true, true).unwrap();
    assert_eq!(validation1.len(), 6);
    assert_eq!(validation1.len(), validation2.len());

    let batches1 = batches(validation1, false, 4);
    let batches2 = batches(validation2, false, 4);
    assert_eq!(batches1.len(), batches2.len());
    for (b1, b2) in batches1.iter().zip(batches2.iter()) {
        for ((name, v1), (_, v2)) in fields(b1).into_iter().zip(fields(b2)) {
            assert_eq!(v1, v2, "{name} differs");
        }
    }
}

#[test]
fn test_overwrite_values() {
    let table = sales_table(2, 2, 16);
    let config = fixture_config().with_randomize_length(None);
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
    let control = fields(&first_batch(dataset.clone(), false));

    let cases = vec![
        (Value::Float(1.0), "price_regular", OverwriteTarget::Encoder, vec!["encoder_cont"]),
        (
            Value::Float(1.0),
            "price_regular",
            OverwriteTarget::All,
            vec!["encoder_cont", "decoder_cont"],
        ),
        (Value::Float(1.0), "price_regular", OverwriteTarget::Decoder, vec!["decoder_cont"]),
        (
            Value::Str("Agency_02".to_string()),
            "agency",
            OverwriteTarget::All,
            vec!["encoder_cat", "decoder_cat"],
        ),
        (
            Value::Str("Agency_02".to_string()),
            "agency",
            OverwriteTarget::Decoder,
            vec!["decoder_cat"],
        ),
    ];

    for (value, variable, target, expected) in cases {
        let mut dataset = dataset.clone();
        dataset.set_overwrite_values(value, variable, target).unwrap();
        let outputs = fields(&first_batch(dataset.clone(), false));
        for ((name, output), (_, control)) in outputs.iter().zip(control.iter()) {
            let changed = output != control;
            assert_eq!(
                changed,
                expected.contains(name),
                "{name} for {variable} with {target:?}"
            );
        }

        dataset.reset_overwrite_values();
        let outputs = fields(&first_batch(dataset, false));
        assert_eq!(outputs, control);
    }
}

#[test]
fn test_overwrite_unknown_variable_fails() {
    let table = sales_table(1, 2, 12);
    let mut dataset = TimeSeriesDataSet::new(&table, fixture_config()).unwrap();
    assert!(dataset
        .set_overwrite_values(Value::Float(1.0), "holiday", OverwriteTarget::All)
        .is_err());
    assert!(matches!(
        dataset.set_overwrite_values(
            Value::Str("Agency_99".to_string()),
            "agency",
            OverwriteTarget::All
        ),
        Err(DatasetError::UnknownCategory { .. })
    ));
}

#[test]
fn test_time_synchronized_batches() {
    let table = sales_table(3, 3, 20);
    let dataset = TimeSeriesDataSet::new(&table, fixture_config()).unwrap();
    let total = dataset.len();
    let dataset = Arc::new(dataset);

    for (shuffle, drop_last, batch_size) in [(true, true, 4), (false, false, 4), (true, false, 64)] {
        let sampler = TimeSynchronizedBatchSampler::new(batch_size, shuffle, drop_last, 5).unwrap();
        let mut loader = WindowDataLoader::<B, _>::new(dataset.clone(), sampler, Default::default(), 5);
        let mut seen = 0;
        for batch in loader.iter() {
            let batch = batch.unwrap();
            let [n, steps] = batch.decoder_time_idx.dims();
            let times = batch.decoder_time_idx.into_data().convert::<i64>().value;
            assert!((0..n).all(|i| times[i * steps] == times[0]));
            if drop_last {
                assert_eq!(n, batch_size);
            }
            seen += n;
        }
        if drop_last {
            assert!(seen <= total);
        } else {
            assert_eq!(seen, total);
        }
    }

    let sampler = TimeSynchronizedBatchSampler::new(1000, false, true, 5).unwrap();
    let mut loader = WindowDataLoader::<B, _>::new(dataset, sampler, Default::default(), 5);
    assert_eq!(loader.iter().count(), 0);
}

#[test]
fn test_dataset_index() {
    let table = sales_table(2, 2, 16);
    let dataset = TimeSeriesDataSet::new(&table, fixture_config()).unwrap();

    let decoded = dataset.decoded_index().unwrap();
    assert_eq!(decoded.len(), dataset.len());
    for entry in decoded.iter() {
        assert!(entry.time_idx_first <= entry.time_idx_first_prediction);
        assert!(entry.time_idx_first_prediction <= entry.time_idx_last);
        assert!(matches!(entry.groups[0], Some(Category::Str(_))));
    }

    let mut rows = 0;
    for batch in batches(dataset.clone(), true, 16) {
        let index = dataset.x_to_index(&batch).unwrap();
        assert_eq!(index.len(), batch.batch_size());
        rows += index.len();
    }
    assert!(rows <= dataset.len());
}

#[test]
fn test_short_series_are_excluded() {
    let table = sales_table(2, 2, 16);
    let short = &rows_equal(&table, "agency", "Agency_02") & &rows_equal(&table, "sku", "SKU_01");
    let late = table.series("time_idx").unwrap().gt(3).unwrap();
    let table = table.filter(&!&(&short & &late)).unwrap();
    let config = base_config()
        .with_min_encoder_length(5)
        .with_min_prediction_length(1);
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();

    assert_eq!(
        dataset.excluded_groups(),
        &[vec![
            Some(Category::Str("Agency_02".to_string())),
            Some(Category::Str("SKU_01".to_string())),
        ]]
    );
    assert!(!dataset.is_empty());
}

#[test]
fn test_new_group_ids() {
    let table = sales_table(3, 2, 16);
    let train_table = table
        .filter(&rows_equal(&table, "agency", "Agency_01"))
        .unwrap();
    let normalizers = vec![
        NormalizerKind::standard(),
        NormalizerKind::Group {
            groups: strings(&["agency", "sku"]),
            scale_by_group: true,
            options: ScalingOptions::default().with_transformation(Transformation::Log1p),
        },
    ];

    for target_normalizer in normalizers {
        let config = base_config()
            .with_min_encoder_length(1)
            .with_target_normalizer(target_normalizer);
        let training = TimeSeriesDataSet::new(&train_table, config).unwrap();
        check_batch(&training, &first_batch(training.clone(), true));

        let test = training.from_dataset(&table, false, false).unwrap();
        let mut unseen = 0;
        for batch in batches(test.clone(), false, 32) {
            check_batch(&test, &batch);
            let index = test.x_to_index(&batch).unwrap();
            unseen += index.iter().filter(|row| row.groups[0].is_none()).count();
        }
        assert!(unseen > 0);
    }
}

#[test]
fn test_unseen_categories_fail_without_add_nan() {
    let table = sales_table(2, 1, 12);
    let train_table = table
        .filter(&rows_equal(&table, "agency", "Agency_01"))
        .unwrap();
    let config = base_config().with_static_categoricals(strings(&["agency"]));
    let training = TimeSeriesDataSet::new(&train_table, config).unwrap();
    assert!(matches!(
        training.from_dataset(&table, false, false),
        Err(DatasetError::UnknownCategory { .. })
    ));
}

#[test]
fn test_invalid_column_names() {
    let config = TimeSeriesDataSetConfig::new(
        "time_idx".to_string(),
        "volume".to_string(),
        strings(&["agency.2", "sku"]),
    );
    assert!(matches!(
        TimeSeriesDataSet::new(&sales_table(1, 1, 8), config),
        Err(DatasetError::ReservedName(_))
    ));

    let config = base_config().with_static_reals(strings(&["__price"]));
    assert!(matches!(
        TimeSeriesDataSet::new(&sales_table(1, 1, 8), config),
        Err(DatasetError::ReservedName(_))
    ));
}

#[test]
fn test_missing_column() {
    let config = base_config().with_static_reals(strings(&["population"]));
    assert!(matches!(
        TimeSeriesDataSet::new(&sales_table(1, 1, 8), config),
        Err(DatasetError::MissingColumn(_))
    ));
}

#[test]
fn test_encoder_normalizer_for_covariates() {
    let table = sales_table(2, 2, 16);
    let mut scalers = BTreeMap::new();
    scalers.insert("price_regular".to_string(), NormalizerKind::encoder());
    let config = base_config()
        .with_min_encoder_length(1)
        .with_time_varying_known_reals(strings(&["price_regular"]))
        .with_scalers(scalers)
        .with_randomize_length(None);
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
    let col = dataset
        .reals()
        .iter()
        .position(|name| name == "price_regular")
        .unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let item = (0..dataset.len())
        .map(|idx| dataset.get_with_rng(idx, &mut rng).unwrap())
        .find(|item| item.encoder_length == 5)
        .unwrap();
    let encoder_mean: f32 = item.x_cont.column(col).iter().take(5).sum::<f32>() / 5.0;
    approx::assert_abs_diff_eq!(encoder_mean, 0.0, epsilon = 1e-4);

    check_batch(&dataset, &first_batch(dataset.clone(), true));
}

#[test]
fn test_encoder_normalized_target_scale() {
    let table = sales_table(1, 2, 16);
    let config = base_config()
        .with_target_normalizer(NormalizerKind::encoder())
        .with_randomize_length(None);
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
    let scales = dataset.scales().unwrap();
    assert_eq!(scales.len(), dataset.len());

    let mut rng = StdRng::seed_from_u64(3);
    for idx in 0..dataset.len() {
        let item = dataset.get_with_rng(idx, &mut rng).unwrap();
        let n = item.encoder_target.len() as f32;
        if n == 0.0 {
            continue;
        }
        let mean = item.encoder_target.iter().sum::<f32>() / n;
        approx::assert_abs_diff_eq!(item.target_scale[0], mean, epsilon = 1e-3);
        assert_eq!(item.target_scale, scales[idx]);
    }
}

#[test]
fn test_embedding_cardinalities() {
    let mut special_days = BTreeMap::new();
    special_days.insert("special_days".to_string(), strings(&["easter_day", "christmas"]));
    let config = fixture_config()
        .with_variable_groups(special_days)
        .with_time_varying_known_categoricals(strings(&["special_days", "month"]))
        .with_categorical_add_nan(strings(&["month"]));
    let dataset = TimeSeriesDataSet::new(&sales_table(2, 3, 24), config).unwrap();

    let cardinalities = dataset.embedding_cardinalities();
    assert_eq!(cardinalities["agency"], 2);
    assert_eq!(cardinalities["sku"], 3);
    // "-", "christmas", "easter_day"
    assert_eq!(cardinalities["special_days"], 3);
    assert_eq!(cardinalities["month"], 13);
    assert_eq!(
        dataset.flat_categoricals(),
        &strings(&["agency", "sku", "easter_day", "christmas", "month"])
    );
}

#[test]
fn test_burn_dataset_interface() {
    let dataset = TimeSeriesDataSet::new(&sales_table(1, 2, 12), fixture_config()).unwrap();
    let item = Dataset::get(&dataset, 0).unwrap();
    assert!(item.decoder_length >= 1);
    assert_eq!(item.x_cont.nrows(), item.len());
    assert!(Dataset::get(&dataset, dataset.len()).is_none());
}

#[test]
fn test_persistence_round_trip() {
    let table = sales_table(2, 2, 16);
    let config = fixture_config().with_randomize_length(None);
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();

    let restored = TimeSeriesDataSet::from_bytes(&dataset.to_bytes().unwrap()).unwrap();
    assert_eq!(restored.len(), dataset.len());
    assert_eq!(restored.index(), dataset.index());
    assert_eq!(restored.reals(), dataset.reals());

    let path = std::env::temp_dir().join("tsdataset-persistence-round-trip.bin");
    dataset.save(&path).unwrap();
    let loaded = TimeSeriesDataSet::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    for idx in [0, dataset.len() / 2, dataset.len() - 1] {
        let expected = dataset.get_with_rng(idx, &mut rng).unwrap();
        assert_eq!(restored.get_with_rng(idx, &mut rng).unwrap(), expected);
        assert_eq!(loaded.get_with_rng(idx, &mut rng).unwrap(), expected);
    }

    // derived datasets keep working off the restored fitted state
    let predict = loaded.from_dataset(&table, true, true).unwrap();
    assert_eq!(predict.len(), 4);
}

#[test]
fn test_randomized_lengths_keep_decoder_start() {
    let table = sales_table(2, 2, 16);
    let config = fixture_config()
        .with_min_encoder_length(0)
        .with_dropout_categoricals(strings(&["month"]))
        .with_randomize_length(Some((0.01, 10.0)));
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
    let month = dataset
        .flat_categoricals()
        .iter()
        .position(|name| name == "month")
        .unwrap();
    let relative = dataset
        .reals()
        .iter()
        .position(|name| name == "relative_time_idx")
        .unwrap();
    let starts = dataset.decoder_start_times();

    let mut rng = StdRng::seed_from_u64(7);
    let mut empty_encoders = 0;
    for idx in 0..dataset.len() {
        let item = dataset.get_with_rng(idx, &mut rng).unwrap();
        assert_eq!(item.time_idx.len(), item.len());
        assert!(item.decoder_length >= 1);
        assert_eq!(item.time_idx[item.encoder_length], starts[idx]);

        let expected: Vec<f32> = (0..item.len())
            .map(|k| (k as f32 - item.encoder_length as f32) / 5.0)
            .collect();
        assert_eq!(item.x_cont.column(relative).to_vec(), expected);

        let months = item.x_cat.column(month);
        if item.encoder_length == 0 {
            empty_encoders += 1;
            assert!(months.iter().all(|code| *code == 0));
        } else {
            assert!(months.iter().all(|code| *code > 0));
        }
    }
    assert!(empty_encoders > 0);
}

#[test]
fn test_scales_on_gapped_series() {
    let table = sales_table(1, 2, 16);
    let gaps = table.series("time_idx").unwrap().equal(4).unwrap();
    let table = table.filter(&!&gaps).unwrap();
    let config = base_config()
        .with_target_normalizer(NormalizerKind::encoder())
        .with_randomize_length(None);
    let dataset = TimeSeriesDataSet::new(&table, config).unwrap();
    let scales = dataset.scales().unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    for (idx, scale) in scales.iter().enumerate() {
        let item = dataset.get_with_rng(idx, &mut rng).unwrap();
        assert_eq!(item.target_scale, *scale);
    }
}
