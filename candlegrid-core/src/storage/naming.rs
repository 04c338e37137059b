//! Reversible block filenames.
//!
//! A block covering `[begin, end)` is stored as
//! `{begin_ms:016x}-{end_ms:016x}.parquet`, where each half is the
//! two's-complement hex of the millisecond timestamp. Fixed width keeps
//! directory listings in chronological order for post-1970 data.

use chrono::{DateTime, Utc};

use crate::block::DataBlock;
use crate::domain::TimeInterval;

pub const BLOCK_EXTENSION: &str = "parquet";

pub fn encode_range(range: &TimeInterval) -> String {
    format!(
        "{:016x}-{:016x}",
        range.begin.timestamp_millis() as u64,
        range.end.timestamp_millis() as u64
    )
}

pub fn decode_range(stem: &str) -> Option<TimeInterval> {
    let (begin, end) = stem.split_once('-')?;
    if begin.len() != 16 || end.len() != 16 {
        return None;
    }
    let decode = |hex: &str| -> Option<DateTime<Utc>> {
        let bits = u64::from_str_radix(hex, 16).ok()?;
        DateTime::from_timestamp_millis(bits as i64)
    };
    let range = TimeInterval::new(decode(begin)?, decode(end)?);
    (!range.is_empty()).then_some(range)
}

pub fn block_file_name(block: &DataBlock) -> String {
    format!("{}.{BLOCK_EXTENSION}", encode_range(&block.interval()))
}
