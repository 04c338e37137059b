//! On-disk layout for grids.
//!
//! Layout: `{root}/{SYMBOL}/{GRANULARITY}/{begin_hex}-{end_hex}.parquet`
//! plus a `meta.json` sidecar per grid directory.
//!
//! Features:
//! - Atomic block writes (write to .tmp, rename into place)
//! - Stale block files removed on save
//! - Per-file validation on load; corrupt files are quarantined
//!   (`{filename}.quarantined`) and skipped

pub mod block_file;
pub mod meta;
pub mod naming;

pub use block_file::{read_block, write_block};
pub use meta::{content_hash, GridMeta, META_FILE};
pub use naming::{block_file_name, decode_range, encode_range, BLOCK_EXTENSION};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::block::DataBlock;
use crate::domain::Granularity;
use crate::error::{CacheError, Result};

pub const QUARANTINE_EXTENSION: &str = "quarantined";

/// How tolerant loading is towards individual bad files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rename rejected files to `*.quarantined` instead of leaving them in place.
    pub quarantine_corrupt: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            quarantine_corrupt: true,
        }
    }
}

/// Outcome of reading one grid directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub rejected: Vec<(PathBuf, String)>,
}

/// Write every block into `dir` and delete block files that no longer
/// correspond to a block.
///
/// If a write fails, files created by this call are removed again so the
/// directory keeps the previous, non-overlapping set of blocks.
pub fn save_blocks(
    dir: &Path,
    granularity: Granularity,
    blocks: &[DataBlock],
) -> Result<GridMeta> {
    fs::create_dir_all(dir)
        .map_err(|e| CacheError::Storage(format!("create {}: {e}", dir.display())))?;

    let existing: HashSet<String> = block_paths(dir)?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .collect();

    let mut current = HashSet::with_capacity(blocks.len());
    for block in blocks.iter().filter(|b| !b.is_empty()) {
        let name = block_file_name(block);
        if let Err(e) = write_block(&dir.join(&name), block) {
            roll_back(dir, current.iter().filter(|n| !existing.contains(*n)));
            return Err(e);
        }
        current.insert(name);
    }

    for path in block_paths(dir)? {
        let stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| !current.contains(n));
        if stale {
            fs::remove_file(&path)
                .map_err(|e| CacheError::Storage(format!("remove {}: {e}", path.display())))?;
        }
    }

    let meta = GridMeta::describe(granularity, blocks)?;
    meta.write(dir)?;
    Ok(meta)
}

/// Remove block files written by an aborted save.
fn roll_back<'a>(dir: &Path, names: impl Iterator<Item = &'a String>) {
    for name in names {
        let path = dir.join(name);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to roll back block file");
        }
    }
}

/// Read every block file in `dir`, skipping (and optionally quarantining)
/// files that fail to decode or validate. The returned blocks are sorted by
/// begin time but not yet checked for overlap.
pub fn load_blocks(
    dir: &Path,
    granularity: Granularity,
    opts: &LoadOptions,
) -> Result<(Vec<DataBlock>, LoadReport)> {
    let mut report = LoadReport::default();
    if !dir.exists() {
        return Ok((Vec::new(), report));
    }

    let mut blocks = Vec::new();
    for path in block_paths(dir)? {
        match load_one(&path, granularity) {
            Ok(block) => {
                report.loaded += 1;
                blocks.push(block);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "rejecting corrupt block file");
                if opts.quarantine_corrupt {
                    quarantine(&path);
                }
                report.rejected.push((path, e.to_string()));
            }
        }
    }

    blocks.sort_by_key(DataBlock::begin);
    Ok((blocks, report))
}

/// Rename a rejected file out of the way of later loads.
fn quarantine(path: &Path) {
    let target = path.with_extension(format!("{BLOCK_EXTENSION}.{QUARANTINE_EXTENSION}"));
    if let Err(e) = fs::rename(path, &target) {
        tracing::warn!(
            path = %path.display(),
            target = %target.display(),
            error = %e,
            "failed to quarantine block file"
        );
    }
}

fn load_one(path: &Path, granularity: Granularity) -> Result<DataBlock> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CacheError::Corruption("unreadable file name".into()))?;
    let expected = decode_range(stem)
        .ok_or_else(|| CacheError::Corruption(format!("undecodable block name '{stem}'")))?;

    let block = read_block(path, granularity)?;
    if block.interval() != expected {
        return Err(CacheError::Corruption(format!(
            "file name says {expected} but content covers {}",
            block.interval()
        )));
    }
    Ok(block)
}

/// Paths of all `*.parquet` files directly inside `dir`.
fn block_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).map_err(|e| CacheError::Storage(format!("read dir: {e}")))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::Storage(format!("dir entry: {e}")))?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(BLOCK_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
