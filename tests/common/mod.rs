use polars::prelude::*;

use tsdataset::{PanelTable, TimeSeriesDataSetConfig};

/// Monthly sales panel of `agencies x skus` series over `steps` months.
pub fn sales_table(agencies: usize, skus: usize, steps: i64) -> PanelTable {
    let mut agency_col = Vec::new();
    let mut sku_col = Vec::new();
    let mut time_col = Vec::new();
    let mut month_col = Vec::new();
    let mut volume_col = Vec::new();
    let mut price_col = Vec::new();
    let mut discount_col = Vec::new();
    let mut easter_col = Vec::new();
    let mut christmas_col = Vec::new();

    for agency in 0..agencies {
        for sku in 0..skus {
            for t in 0..steps {
                let level = (10 + 5 * agency + 3 * sku) as f64;
                let season = ((t * 7 + agency as i64 * 3 + sku as i64) % 11) as f64;
                let month = t % 12 + 1;

                agency_col.push(format!("Agency_{:02}", agency + 1));
                sku_col.push(format!("SKU_{:02}", sku + 1));
                time_col.push(t);
                month_col.push(month);
                volume_col.push(level + season);
                price_col.push(1000.0 + 25.0 * sku as f64 - 3.0 * t as f64);
                discount_col.push(((t + sku as i64) % 4) as f64 * 0.05);
                easter_col.push(if month == 4 { "easter_day" } else { "-" }.to_string());
                christmas_col.push(if month == 12 { "christmas" } else { "-" }.to_string());
            }
        }
    }

    df!(
        "agency" => agency_col,
        "sku" => sku_col,
        "time_idx" => time_col,
        "month" => month_col,
        "volume" => volume_col,
        "price_regular" => price_col,
        "discount" => discount_col,
        "easter_day" => easter_col,
        "christmas" => christmas_col
    )
    .unwrap()
    .into()
}

pub fn base_config() -> TimeSeriesDataSetConfig {
    TimeSeriesDataSetConfig::new(
        "time_idx".to_string(),
        "volume".to_string(),
        vec!["agency".to_string(), "sku".to_string()],
    )
    .with_max_encoder_length(5)
    .with_max_prediction_length(2)
}

/// Rows of `table` whose `name` column equals `value`.
pub fn rows_equal(table: &PanelTable, name: &str, value: &str) -> BooleanChunked {
    table.series(name).unwrap().equal(value).unwrap()
}
