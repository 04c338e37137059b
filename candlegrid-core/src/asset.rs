//! AssetView — every grid of one symbol plus its zero-time floor.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::{Candle, Granularity};
use crate::error::{CacheError, Result};
use crate::grid::{GridStats, Retrieval, SharedGrid};
use crate::storage::{GridMeta, LoadOptions, LoadReport};

#[derive(Debug)]
pub struct AssetView {
    symbol: String,
    grids: RwLock<HashMap<Granularity, Arc<SharedGrid>>>,
    zero_time: RwLock<DateTime<Utc>>,
}

impl AssetView {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            grids: RwLock::new(HashMap::new()),
            zero_time: RwLock::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Grid for `granularity`, created empty on first use.
    pub fn grid(&self, granularity: Granularity) -> Arc<SharedGrid> {
        if let Some(grid) = self.existing_grid(granularity) {
            return grid;
        }
        let mut grids = self.grids.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            grids
                .entry(granularity)
                .or_insert_with(|| Arc::new(SharedGrid::new(granularity))),
        )
    }

    pub fn existing_grid(&self, granularity: Granularity) -> Option<Arc<SharedGrid>> {
        self.grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&granularity)
            .cloned()
    }

    /// Granularities with a grid, finest first.
    pub fn granularities(&self) -> Vec<Granularity> {
        let mut out: Vec<_> = self
            .grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        out.sort_by_key(|g| g.duration());
        out
    }

    /// Earliest instant retrieval will ever report; min time when unset.
    pub fn zero_time(&self) -> DateTime<Utc> {
        *self.zero_time.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare that nothing before `t` exists (e.g. a listing date). Cached
    /// data is left untouched; only queries are clamped.
    pub fn set_zero_time(&self, t: DateTime<Utc>) {
        *self.zero_time.write().unwrap_or_else(PoisonError::into_inner) = t;
    }

    /// Retrieve from the `granularity` grid with `begin` clamped to the zero
    /// time. Does not create the grid.
    pub fn retrieve(
        &self,
        granularity: Granularity,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Retrieval {
        let begin = begin.max(self.zero_time());
        match self.existing_grid(granularity) {
            Some(grid) => grid.retrieve(begin, end),
            None => Retrieval::uncached(begin, end),
        }
    }

    pub fn append(&self, granularity: Granularity, candles: Vec<Candle>) -> Result<()> {
        self.grid(granularity).append(candles)
    }

    pub fn refine(&self, target: usize) {
        for granularity in self.granularities() {
            self.grid(granularity).refine(target);
        }
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.snapshot().iter().map(|g| g.approx_size_bytes()).sum()
    }

    pub fn stats(&self) -> Vec<GridStats> {
        let mut stats: Vec<_> = self.snapshot().iter().map(|g| g.stats()).collect();
        stats.sort_by_key(|s| s.granularity.duration());
        stats
    }

    /// Write every grid to `folder/<granularity>/`.
    pub fn save(&self, folder: &Path) -> Result<Vec<GridMeta>> {
        self.snapshot()
            .iter()
            .map(|grid| grid.save(&folder.join(grid.granularity().dir_name())))
            .collect()
    }

    /// Read every granularity directory under `folder`. Directories whose
    /// name is not a granularity are skipped.
    pub fn load(
        folder: &Path,
        symbol: impl Into<String>,
        opts: &LoadOptions,
    ) -> Result<(Self, LoadReport)> {
        let view = Self::new(symbol);
        let mut report = LoadReport::default();

        let entries = fs::read_dir(folder)
            .map_err(|e| CacheError::Storage(format!("read {}: {e}", folder.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Storage(format!("dir entry: {e}")))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(granularity) = name.parse::<Granularity>() else {
                tracing::warn!(path = %path.display(), "skipping unknown granularity directory");
                continue;
            };

            let (grid, grid_report) = SharedGrid::load_with_report(&path, granularity, opts)?;
            report.loaded += grid_report.loaded;
            report.rejected.extend(grid_report.rejected);
            view.grids
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(granularity, Arc::new(grid));
        }
        Ok((view, report))
    }

    fn snapshot(&self) -> Vec<Arc<SharedGrid>> {
        self.grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
