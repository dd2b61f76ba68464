pub mod data;
pub mod error;
pub mod utils;

pub use data::batchitem::BatchItem;
pub use data::collate::Collator;
pub use data::config::TimeSeriesDataSetConfig;
pub use data::item::WindowItem;
pub use data::loader::WindowDataLoader;
pub use data::normalizers::{NormalizerKind, ScalingMethod, ScalingOptions, Transformation};
pub use data::overwrite::OverwriteTarget;
pub use data::sampler::{BatchSampler, RandomBatchSampler, TimeSynchronizedBatchSampler};
pub use data::table::{Category, PanelTable, Value};
pub use data::timeseries::TimeSeriesDataSet;
pub use error::{DatasetError, Result};
