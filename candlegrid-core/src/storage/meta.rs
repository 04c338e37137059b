//! Metadata sidecar written next to each grid's block files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::block::DataBlock;
use crate::domain::Granularity;
use crate::error::{CacheError, Result};

pub const META_FILE: &str = "meta.json";

/// Summary of a saved grid. Informational only: loading never depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMeta {
    pub granularity: Granularity,
    pub block_count: usize,
    pub candle_count: usize,
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub data_hash: String,
    pub saved_at: DateTime<Utc>,
}

impl GridMeta {
    pub fn describe(granularity: Granularity, blocks: &[DataBlock]) -> Result<Self> {
        Ok(Self {
            granularity,
            block_count: blocks.len(),
            candle_count: blocks.iter().map(DataBlock::len).sum(),
            begin: blocks.first().map(DataBlock::begin),
            end: blocks.last().map(DataBlock::end),
            data_hash: content_hash(blocks)?,
            saved_at: Utc::now(),
        })
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CacheError::Storage(format!("meta serialization: {e}")))?;
        fs::write(dir.join(META_FILE), json)
            .map_err(|e| CacheError::Storage(format!("meta write: {e}")))
    }

    /// Read the sidecar in `dir`, if there is a readable one.
    pub fn read(dir: &Path) -> Option<Self> {
        let content = fs::read_to_string(dir.join(META_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// BLAKE3 over the serialized candles of every block, in order.
pub fn content_hash(blocks: &[DataBlock]) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    for block in blocks {
        let bytes = serde_json::to_vec(block.candles())
            .map_err(|e| CacheError::Storage(format!("hash serialization: {e}")))?;
        hasher.update(&bytes);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
