//! Cache — symbol-keyed map of [`AssetView`]s with whole-tree persistence.
//!
//! On-disk layout mirrors the map: `root/<SYMBOL>/<GRANULARITY>/<range>.parquet`.
//! Symbols are used verbatim as directory names.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::asset::AssetView;
use crate::domain::{Candle, Granularity, Symbol};
use crate::error::{CacheError, Result};
use crate::grid::{GridStats, Retrieval};
use crate::storage::{LoadOptions, LoadReport};

#[derive(Debug, Default)]
pub struct Cache {
    assets: RwLock<HashMap<Symbol, Arc<AssetView>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// View for `symbol`, created empty on first use.
    pub fn asset(&self, symbol: &str) -> Arc<AssetView> {
        if let Some(view) = self.get(symbol) {
            return view;
        }
        let mut assets = self.assets.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            assets
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(AssetView::new(symbol))),
        )
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<AssetView>> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    pub fn remove(&self, symbol: &str) -> Option<Arc<AssetView>> {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(symbol)
    }

    /// Cached symbols, sorted.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self
            .assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        symbols.sort();
        symbols
    }

    pub fn retrieve(
        &self,
        symbol: &str,
        granularity: Granularity,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Retrieval {
        match self.get(symbol) {
            Some(view) => view.retrieve(granularity, begin, end),
            None => Retrieval::uncached(begin, end),
        }
    }

    pub fn append(
        &self,
        symbol: &str,
        granularity: Granularity,
        candles: Vec<Candle>,
    ) -> Result<()> {
        self.asset(symbol).append(granularity, candles)
    }

    pub fn refine_all(&self, target: usize) {
        self.snapshot()
            .par_iter()
            .for_each(|view| view.refine(target));
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.snapshot().iter().map(|v| v.approx_size_bytes()).sum()
    }

    /// Per (symbol, granularity) summary, sorted by symbol then granularity.
    pub fn stats(&self) -> Vec<(Symbol, GridStats)> {
        let mut views = self.snapshot();
        views.sort_by(|a, b| a.symbol().cmp(b.symbol()));
        views
            .iter()
            .flat_map(|view| {
                view.stats()
                    .into_iter()
                    .map(|s| (view.symbol().to_string(), s))
            })
            .collect()
    }

    /// Save every symbol under `root`, one symbol per rayon task.
    pub fn save(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)
            .map_err(|e| CacheError::Storage(format!("create {}: {e}", root.display())))?;

        let views = self.snapshot();
        let grids: usize = views
            .par_iter()
            .map(|view| view.save(&root.join(view.symbol())).map(|metas| metas.len()))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sum();

        tracing::info!(
            root = %root.display(),
            symbols = views.len(),
            grids,
            "cache saved"
        );
        Ok(())
    }

    /// Load every symbol directory under `root`. A missing root yields an
    /// empty cache.
    pub fn load(root: &Path, opts: &LoadOptions) -> Result<(Self, LoadReport)> {
        let cache = Self::new();
        let mut report = LoadReport::default();
        if !root.exists() {
            return Ok((cache, report));
        }

        let entries = fs::read_dir(root)
            .map_err(|e| CacheError::Storage(format!("read {}: {e}", root.display())))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Storage(format!("dir entry: {e}")))?;
            if entry.path().is_dir() {
                dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
            }
        }

        let loaded: Vec<(AssetView, LoadReport)> = dirs
            .par_iter()
            .map(|(symbol, path)| AssetView::load(path, symbol.as_str(), opts))
            .collect::<Result<_>>()?;

        {
            let mut assets = cache.assets.write().unwrap_or_else(PoisonError::into_inner);
            for (view, view_report) in loaded {
                report.loaded += view_report.loaded;
                report.rejected.extend(view_report.rejected);
                assets.insert(view.symbol().to_string(), Arc::new(view));
            }
        }

        tracing::info!(
            root = %root.display(),
            symbols = dirs.len(),
            blocks = report.loaded,
            rejected = report.rejected.len(),
            "cache loaded"
        );
        Ok((cache, report))
    }

    fn snapshot(&self) -> Vec<Arc<AssetView>> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
