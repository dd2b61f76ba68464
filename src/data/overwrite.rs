use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::data::item::WindowData;

/// Part of every window an overwrite applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwriteTarget {
    All,
    Encoder,
    Decoder,
}

impl OverwriteTarget {
    fn rows(&self, encoder_length: usize, length: usize) -> Range<usize> {
        match self {
            OverwriteTarget::All => 0..length,
            OverwriteTarget::Encoder => 0..encoder_length.min(length),
            OverwriteTarget::Decoder => encoder_length.min(length)..length,
        }
    }
}

/// Already encoded value and the store columns it replaces.
#[derive(Clone, Debug, PartialEq)]
pub enum OverwriteColumns {
    Continuous(usize, f32),
    Categorical(Vec<usize>, i64),
}

/// Read-time overlay; the tensor store itself is never modified.
#[derive(Clone, Debug, PartialEq)]
pub struct Overwrite {
    pub columns: OverwriteColumns,
    pub target: OverwriteTarget,
}

impl Overwrite {
    pub fn apply(&self, data: &mut WindowData, encoder_length: usize) {
        let rows = self.target.rows(encoder_length, data.len());
        match &self.columns {
            OverwriteColumns::Continuous(col, value) => {
                for row in rows {
                    data.continuous[[row, *col]] = *value;
                }
            }
            OverwriteColumns::Categorical(cols, value) => {
                for row in rows {
                    for col in cols {
                        data.categorical[[row, *col]] = *value;
                    }
                }
            }
        }
    }
}
