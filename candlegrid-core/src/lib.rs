//! candlegrid core — gap-aware block cache for fixed-granularity candles.
//!
//! Layers, leaf to root:
//! - Domain types (candles, granularities, half-open time intervals)
//! - `DataBlock`: a contiguous, validated run of candles
//! - `BlockGrid`: ordered non-overlapping blocks answering range queries with
//!   either the candles or the exact gap that has to be fetched
//! - `AssetView` / `Cache`: per-symbol and whole-cache maps of locked grids
//! - Parquet persistence, TOML config and a fill loop over a `CandleSource`

pub mod asset;
pub mod block;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod fill;
pub mod grid;
pub mod search;
pub mod storage;
pub mod synthetic;

pub use asset::AssetView;
pub use block::DataBlock;
pub use cache::Cache;
pub use config::CacheConfig;
pub use domain::{Candle, Granularity, Symbol, TimeInterval};
pub use error::{CacheError, Result};
pub use fill::{fill_range, CandleSource, FillReport};
pub use grid::{BlockGrid, GridStats, Retrieval, SharedGrid};
pub use storage::{LoadOptions, LoadReport};
pub use synthetic::SyntheticSource;
