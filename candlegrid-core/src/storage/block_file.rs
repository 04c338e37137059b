//! One Parquet file per block.
//!
//! Writes are atomic (write `.tmp`, rename into place). Reads rebuild the
//! block through [`DataBlock::new`], so a file whose rows are not contiguous
//! is rejected like any other corrupt input.

use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::fs;
use std::path::Path;

use crate::block::DataBlock;
use crate::domain::{Candle, Granularity};
use crate::error::{CacheError, Result};

const COLUMNS: [&str; 9] = [
    "open_time",
    "close_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "quote_volume",
    "trades",
];

/// Write `block` to `path` atomically.
pub fn write_block(path: &Path, block: &DataBlock) -> Result<()> {
    let mut df = candles_to_dataframe(block.candles())?;
    let tmp_path = path.with_extension("parquet.tmp");

    let file = fs::File::create(&tmp_path)
        .map_err(|e| CacheError::Storage(format!("create {}: {e}", tmp_path.display())))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| CacheError::Storage(format!("write parquet: {e}")))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CacheError::Storage(format!("atomic rename failed: {e}"))
    })
}

/// Read and validate the block stored at `path`.
pub fn read_block(path: &Path, granularity: Granularity) -> Result<DataBlock> {
    let file = fs::File::open(path)
        .map_err(|e| CacheError::Storage(format!("open {}: {e}", path.display())))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CacheError::Storage(format!("read parquet: {e}")))?;

    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(CacheError::Storage(format!("missing column '{name}'")));
        }
    }

    DataBlock::new(granularity, dataframe_to_candles(&df)?)
}

fn candles_to_dataframe(candles: &[Candle]) -> Result<DataFrame> {
    let open_times: Vec<i64> = candles.iter().map(|c| c.open_time.timestamp_millis()).collect();
    let close_times: Vec<i64> = candles.iter().map(|c| c.close_time.timestamp_millis()).collect();
    let opens: Vec<f64> = candles.iter().map(|c| c.open).collect();
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let quote_volumes: Vec<f64> = candles.iter().map(|c| c.quote_volume).collect();
    let trades: Vec<u64> = candles.iter().map(|c| c.trades).collect();

    DataFrame::new(vec![
        Column::new("open_time".into(), open_times),
        Column::new("close_time".into(), close_times),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("quote_volume".into(), quote_volumes),
        Column::new("trades".into(), trades),
    ])
    .map_err(|e| CacheError::Storage(format!("dataframe creation: {e}")))
}

fn dataframe_to_candles(df: &DataFrame) -> Result<Vec<Candle>> {
    let column_err = |e: PolarsError| CacheError::Storage(format!("column read: {e}"));

    let open_time_ca = df.column("open_time").map_err(column_err)?.i64().map_err(column_err)?;
    let close_time_ca = df.column("close_time").map_err(column_err)?.i64().map_err(column_err)?;
    let open_ca = df.column("open").map_err(column_err)?.f64().map_err(column_err)?;
    let high_ca = df.column("high").map_err(column_err)?.f64().map_err(column_err)?;
    let low_ca = df.column("low").map_err(column_err)?.f64().map_err(column_err)?;
    let close_ca = df.column("close").map_err(column_err)?.f64().map_err(column_err)?;
    let volume_ca = df.column("volume").map_err(column_err)?.f64().map_err(column_err)?;
    let quote_ca = df
        .column("quote_volume")
        .map_err(column_err)?
        .f64()
        .map_err(column_err)?;
    let trades_ca = df.column("trades").map_err(column_err)?.u64().map_err(column_err)?;

    let timestamp = |value: Option<i64>, row: usize, name: &str| -> Result<DateTime<Utc>> {
        value
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| CacheError::Storage(format!("invalid {name} at row {row}")))
    };

    let n = df.height();
    let mut candles = Vec::with_capacity(n);
    for i in 0..n {
        candles.push(Candle {
            open_time: timestamp(open_time_ca.get(i), i, "open_time")?,
            close_time: timestamp(close_time_ca.get(i), i, "close_time")?,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: volume_ca.get(i).unwrap_or(0.0),
            quote_volume: quote_ca.get(i).unwrap_or(0.0),
            trades: trades_ca.get(i).unwrap_or(0),
        });
    }
    Ok(candles)
}
