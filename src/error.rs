use thiserror::Error;

use crate::data::table::Category;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("column `{0}` not found in table")]
    MissingColumn(String),

    #[error("column `{column}` cannot be used as {expected}")]
    ColumnType { column: String, expected: &'static str },

    #[error("column `{column}` contains missing values at row {row}")]
    MissingValues { column: String, row: usize },

    #[error("column name `{0}` is reserved or invalid")]
    ReservedName(String),

    #[error("target `{0}` must not be a time varying known real")]
    TargetIsKnownReal(String),

    #[error("weight `{0}` must not be used as a feature")]
    WeightIsFeature(String),

    #[error("rows are not uniquely identified by group ids and time index (duplicate at row {0})")]
    DuplicateKey(usize),

    #[error("unknown category {value:?} for `{column}`")]
    UnknownCategory { column: String, value: Option<Category> },

    #[error("code {code} is out of range for encoder `{column}`")]
    UnknownCode { column: String, code: i64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("decoder length {decoder_length} of window {index} is below minimum prediction length {min_prediction_length}")]
    LengthViolation {
        index: usize,
        decoder_length: i64,
        min_prediction_length: usize,
    },

    #[error("window {index} reconstructed to {actual} steps, expected {expected}")]
    IncompleteWindow {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("window index {index} out of range for dataset of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("table error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}
