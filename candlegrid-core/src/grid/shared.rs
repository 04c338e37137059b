//! Reader-writer locked grid.
//!
//! `retrieve`/`save`/`stats` share the read lock; `append`/`refine` take the
//! write lock. A poisoned lock is recovered: every mutation re-validates the
//! grid, so a panic mid-operation cannot leave it silently inconsistent.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{BlockGrid, Retrieval};
use crate::domain::{Candle, Granularity};
use crate::error::Result;
use crate::storage::{GridMeta, LoadOptions, LoadReport};

/// Point-in-time summary of one grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridStats {
    pub granularity: Granularity,
    pub blocks: usize,
    pub candles: usize,
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub approx_size_bytes: usize,
}

#[derive(Debug)]
pub struct SharedGrid {
    granularity: Granularity,
    inner: RwLock<BlockGrid>,
}

impl SharedGrid {
    pub fn new(granularity: Granularity) -> Self {
        Self::from_grid(BlockGrid::new(granularity))
    }

    pub fn from_grid(grid: BlockGrid) -> Self {
        Self {
            granularity: grid.granularity(),
            inner: RwLock::new(grid),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Shared access for multi-step reads.
    pub fn read(&self) -> RwLockReadGuard<'_, BlockGrid> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BlockGrid> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn retrieve(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Retrieval {
        self.read().retrieve(begin, end)
    }

    pub fn append(&self, candles: Vec<Candle>) -> Result<()> {
        self.write().append(candles)
    }

    pub fn refine(&self, target: usize) {
        self.write().refine(target);
    }

    pub fn save(&self, folder: &Path) -> Result<GridMeta> {
        self.read().save(folder)
    }

    pub fn load_with_report(
        folder: &Path,
        granularity: Granularity,
        opts: &LoadOptions,
    ) -> Result<(Self, LoadReport)> {
        let (grid, report) = BlockGrid::load_with_report(folder, granularity, opts)?;
        Ok((Self::from_grid(grid), report))
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.read().approx_size_bytes()
    }

    pub fn stats(&self) -> GridStats {
        let grid = self.read();
        GridStats {
            granularity: self.granularity,
            blocks: grid.len(),
            candles: grid.candle_count(),
            begin: (!grid.is_empty()).then(|| grid.begin()),
            end: (!grid.is_empty()).then(|| grid.end()),
            approx_size_bytes: grid.approx_size_bytes(),
        }
    }
}
