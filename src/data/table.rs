use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// Label of a categorical value. Floats are not valid categories.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Int(i64),
    Str(String),
}

impl From<i64> for Category {
    fn from(value: i64) -> Self {
        Category::Int(value)
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Category::Str(value.to_string())
    }
}

/// Single cell of a panel table, as used by fill and overwrite values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<Category> {
        match self {
            Value::Int(v) => Some(Category::Int(*v)),
            Value::Str(v) => Some(Category::Str(v.clone())),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

/// Row number of the input table, carried through sorting.
pub(crate) const ROW_INDEX: &str = "__row";

/// Panel of time series: one row per (group, time step) in a polars [`DataFrame`].
#[derive(Clone, Debug, Default)]
pub struct PanelTable {
    frame: DataFrame,
}

impl From<DataFrame> for PanelTable {
    fn from(frame: DataFrame) -> Self {
        Self { frame }
    }
}

impl PanelTable {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    /// Loads a table from a file with one JSON object per line.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let frame = JsonReader::new(file)
            .with_json_format(JsonFormat::JsonLines)
            .finish()?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn series(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .map(|column| column.as_materialized_series())
            .map_err(|_| DatasetError::MissingColumn(name.to_string()))
    }

    /// Keeps the rows where `mask` is true.
    pub fn filter(&self, mask: &BooleanChunked) -> Result<Self> {
        Ok(Self {
            frame: self.frame.filter(mask)?,
        })
    }

    /// Stable sort by `by`, with the input row number appended as [`ROW_INDEX`].
    pub(crate) fn sorted(&self, by: &[String]) -> Result<Self> {
        let by: Vec<PlSmallStr> = by.iter().map(|name| PlSmallStr::from(name.as_str())).collect();
        let frame = self
            .frame
            .with_row_index(ROW_INDEX.into(), None)?
            .sort(by, SortMultipleOptions::default().with_maintain_order(true))?;
        Ok(Self { frame })
    }

    pub fn value(&self, name: &str, row: usize) -> Result<Value> {
        let value = match self.series(name)?.get(row)? {
            AnyValue::Null => Value::Null,
            AnyValue::String(v) => Value::Str(v.to_string()),
            AnyValue::StringOwned(v) => Value::Str(v.to_string()),
            AnyValue::Float32(v) => Value::Float(v as f64),
            AnyValue::Float64(v) => Value::Float(v),
            other => other.extract::<i64>().map(Value::Int).unwrap_or(Value::Null),
        };
        Ok(value)
    }

    /// Values as categories; float columns are rejected.
    pub fn categories(&self, name: &str) -> Result<Vec<Option<Category>>> {
        let series = self.series(name)?;
        match series.dtype() {
            DataType::String => Ok(series
                .str()?
                .into_iter()
                .map(|v| v.map(|s| Category::Str(s.to_string())))
                .collect()),
            DataType::Null => Ok(vec![None; series.len()]),
            dtype if dtype.is_integer() => Ok(series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| v.map(Category::Int))
                .collect()),
            _ => Err(DatasetError::ColumnType {
                column: name.to_string(),
                expected: "categorical",
            }),
        }
    }

    /// Values as reals; string columns are rejected.
    pub fn reals(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let series = self.series(name)?;
        let dtype = series.dtype();
        if !(dtype.is_float() || dtype.is_integer() || *dtype == DataType::Null) {
            return Err(DatasetError::ColumnType {
                column: name.to_string(),
                expected: "continuous",
            });
        }
        Ok(series.cast(&DataType::Float64)?.f64()?.into_iter().collect())
    }

    /// Reals without missing values.
    pub fn dense_reals(&self, name: &str) -> Result<Vec<f64>> {
        self.reals(name)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| match value {
                Some(v) if v.is_finite() => Ok(v),
                _ => Err(DatasetError::MissingValues {
                    column: name.to_string(),
                    row,
                }),
            })
            .collect()
    }

    pub fn integers(&self, name: &str) -> Result<Vec<i64>> {
        let series = self.series(name)?;
        if !series.dtype().is_integer() {
            return Err(DatasetError::ColumnType {
                column: name.to_string(),
                expected: "integer time index",
            });
        }
        series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| DatasetError::MissingValues {
                    column: name.to_string(),
                    row,
                })
            })
            .collect()
    }
}
