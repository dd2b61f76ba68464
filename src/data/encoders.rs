use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::table::Category;
use crate::error::{DatasetError, Result};

/// Label encoder that can reserve code 0 for missing and unseen values.
///
/// Classes are kept sorted so that codes are stable across fits on the same
/// vocabulary. Without `add_nan`, transforming a value outside the fitted
/// vocabulary fails with [`DatasetError::UnknownCategory`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NaNLabelEncoder {
    name: String,
    add_nan: bool,
    classes: Vec<Option<Category>>,
}

impl NaNLabelEncoder {
    pub fn new(name: impl Into<String>, add_nan: bool) -> Self {
        Self {
            name: name.into(),
            add_nan,
            classes: Vec::new(),
        }
    }

    pub fn fit<'a, I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = &'a Option<Category>>,
    {
        let mut classes: Vec<Option<Category>> = values
            .into_iter()
            .filter(|v| !(self.add_nan && v.is_none()))
            .cloned()
            .collect();
        classes.sort();
        classes.dedup();
        debug!(encoder = %self.name, classes = classes.len(), "fitted label encoder");

        self.classes = classes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_nan(&self) -> bool {
        self.add_nan
    }

    pub fn classes(&self) -> &[Option<Category>] {
        &self.classes
    }

    /// Number of distinct codes, including the reserved missing code.
    pub fn cardinality(&self) -> usize {
        self.classes.len() + self.offset() as usize
    }

    fn offset(&self) -> i64 {
        if self.add_nan {
            1
        } else {
            0
        }
    }

    pub fn transform_one(&self, value: &Option<Category>) -> Result<i64> {
        match self.classes.binary_search(value) {
            Ok(pos) => Ok(pos as i64 + self.offset()),
            Err(_) if self.add_nan => Ok(0),
            Err(_) => Err(DatasetError::UnknownCategory {
                column: self.name.clone(),
                value: value.clone(),
            }),
        }
    }

    pub fn transform(&self, values: &[Option<Category>]) -> Result<Vec<i64>> {
        values.iter().map(|v| self.transform_one(v)).collect()
    }

    pub fn inverse_transform_one(&self, code: i64) -> Result<Option<Category>> {
        if self.add_nan && code == 0 {
            return Ok(None);
        }
        let pos = code - self.offset();
        if pos < 0 || pos as usize >= self.classes.len() {
            return Err(DatasetError::UnknownCode {
                column: self.name.clone(),
                code,
            });
        }
        Ok(self.classes[pos as usize].clone())
    }

    pub fn inverse_transform(&self, codes: &[i64]) -> Result<Vec<Option<Category>>> {
        codes.iter().map(|c| self.inverse_transform_one(*c)).collect()
    }
}
