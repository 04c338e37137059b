//! BlockGrid — ordered, non-overlapping blocks for one (symbol, granularity).
//!
//! Blocks are sorted by begin time and never overlap. `append` merges the
//! incoming run with every block it touches; `refine` deliberately leaves
//! adjacent pieces behind, which `retrieve` walks across transparently.

pub mod shared;

pub use shared::{GridStats, SharedGrid};

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::block::DataBlock;
use crate::domain::{Candle, Granularity, TimeInterval};
use crate::error::{CacheError, Result};
use crate::search::{lower_bound_by_key, upper_bound_by_key};
use crate::storage::{self, GridMeta, LoadOptions, LoadReport};

/// Answer to a range query: either the full candle run or the hole that has
/// to be fetched first.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Hit(Vec<Candle>),
    /// Tightest range bounded by existing block edges (or the min/max time
    /// sentinels when no block supports that side).
    Gap(TimeInterval),
}

impl Retrieval {
    /// Answer for a grid that holds nothing: the whole time line is missing.
    pub fn uncached(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if begin >= end {
            Self::Hit(Vec::new())
        } else {
            Self::Gap(TimeInterval::new(
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
            ))
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn candles(&self) -> Option<&[Candle]> {
        match self {
            Self::Hit(candles) => Some(candles),
            Self::Gap(_) => None,
        }
    }

    pub fn gap(&self) -> Option<TimeInterval> {
        match self {
            Self::Hit(_) => None,
            Self::Gap(gap) => Some(*gap),
        }
    }

    pub fn into_candles(self) -> Option<Vec<Candle>> {
        match self {
            Self::Hit(candles) => Some(candles),
            Self::Gap(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockGrid {
    granularity: Granularity,
    blocks: Vec<DataBlock>,
}

impl BlockGrid {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            blocks: Vec::new(),
        }
    }

    /// Build a grid from pre-existing blocks, which must already be ordered.
    pub fn from_blocks(granularity: Granularity, blocks: Vec<DataBlock>) -> Result<Self> {
        let grid = Self {
            granularity,
            blocks: blocks.into_iter().filter(|b| !b.is_empty()).collect(),
        };
        if !grid.blocks_are_ordered() {
            return Err(CacheError::Corruption(format!(
                "{granularity} blocks are not chronologically consistent"
            )));
        }
        Ok(grid)
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn candle_count(&self) -> usize {
        self.blocks.iter().map(DataBlock::len).sum()
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.blocks.iter().map(DataBlock::approx_size_bytes).sum()
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.blocks
            .first()
            .map_or(DateTime::<Utc>::MAX_UTC, DataBlock::begin)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.blocks
            .last()
            .map_or(DateTime::<Utc>::MIN_UTC, DataBlock::end)
    }

    /// Covered ranges, with adjacent blocks folded together.
    pub fn coverage(&self) -> Vec<TimeInterval> {
        let mut ranges: Vec<TimeInterval> = Vec::new();
        for block in &self.blocks {
            match ranges.last_mut() {
                Some(last) if last.end == block.begin() => last.end = block.end(),
                _ => ranges.push(block.interval()),
            }
        }
        ranges
    }

    /// Index of the block containing `t`.
    pub fn find_begin_block(&self, t: DateTime<Utc>) -> Option<usize> {
        upper_bound_by_key(&self.blocks, &t, DataBlock::begin)
            .checked_sub(1)
            .filter(|&i| self.blocks[i].end() > t)
    }

    /// Index of the block that covers the instant just before `t`
    /// (`begin < t <= end`).
    pub fn find_end_block(&self, t: DateTime<Utc>) -> Option<usize> {
        lower_bound_by_key(&self.blocks, &t, DataBlock::begin)
            .checked_sub(1)
            .filter(|&i| self.blocks[i].end() >= t)
    }

    /// Candles covering `[begin, end)` (widened to candle boundaries), or
    /// the gap that prevents it.
    pub fn retrieve(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Retrieval {
        if begin >= end {
            return Retrieval::Hit(Vec::new());
        }

        let Some(first) = self.find_begin_block(begin) else {
            let left = match self.blocks.partition_point(|b| b.end() <= begin) {
                0 => DateTime::<Utc>::MIN_UTC,
                n => self.blocks[n - 1].end(),
            };
            return Retrieval::Gap(TimeInterval::new(left, self.right_support(end)));
        };

        let mut last = first;
        while self.blocks[last].end() < end {
            match self.blocks.get(last + 1) {
                Some(next) if self.blocks[last].is_adjacent_and_preceding_to(next) => last += 1,
                _ => {
                    let left = self.blocks[last].end();
                    return Retrieval::Gap(TimeInterval::new(left, self.right_support(end)));
                }
            }
        }

        let mut candles = Vec::new();
        for block in &self.blocks[first..=last] {
            candles.extend_from_slice(block.slice(begin, end));
        }
        Retrieval::Hit(candles)
    }

    /// Begin of the run of adjacent blocks reaching `end`, or of the first
    /// block after `end` when nothing reaches it.
    fn right_support(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(mut k) = self.find_end_block(end) {
            while k > 0 && self.blocks[k - 1].is_adjacent_and_preceding_to(&self.blocks[k]) {
                k -= 1;
            }
            return self.blocks[k].begin();
        }
        let next = lower_bound_by_key(&self.blocks, &end, DataBlock::begin);
        self.blocks
            .get(next)
            .map_or(DateTime::<Utc>::MAX_UTC, DataBlock::begin)
    }

    /// Merge freshly fetched candles into the grid. The new candles win every
    /// time slot they define; existing blocks they touch are absorbed.
    pub fn append(&mut self, candles: Vec<Candle>) -> Result<()> {
        if candles.is_empty() {
            return Ok(());
        }
        let mut merged = DataBlock::new(self.granularity, candles)?;
        let (begin, end) = (merged.begin(), merged.end());

        let lo = self.blocks.partition_point(|b| b.end() < begin);
        let hi = self.blocks.partition_point(|b| b.begin() <= end);

        let mut absorbed = 0;
        for candidate in self.blocks[lo..hi.max(lo)].iter().rev() {
            if merged.can_be_merged_with(candidate) {
                merged.merge_preserve(candidate)?;
                absorbed += 1;
            }
        }

        tracing::debug!(
            granularity = %self.granularity,
            new_begin = %begin,
            new_end = %end,
            absorbed,
            blocks = self.blocks.len(),
            "appending block"
        );

        self.blocks.splice(lo..hi.max(lo), std::iter::once(merged));

        if !self.blocks_are_ordered() {
            return Err(CacheError::Corruption(format!(
                "{} grid lost chronological order after appending [{begin}, {end})",
                self.granularity
            )));
        }
        Ok(())
    }

    /// Cut every block into pieces of at most `target` candles.
    pub fn refine(&mut self, target: usize) {
        let before = self.blocks.len();
        self.blocks = self
            .blocks
            .iter()
            .flat_map(|block| block.split(target))
            .filter(|block| !block.is_empty())
            .collect();
        tracing::debug!(
            granularity = %self.granularity,
            target,
            before,
            after = self.blocks.len(),
            "refined grid"
        );
    }

    /// Sorted, non-empty, same granularity and pairwise non-overlapping.
    pub fn blocks_are_ordered(&self) -> bool {
        self.blocks
            .iter()
            .all(|b| !b.is_empty() && b.granularity() == self.granularity)
            && self.blocks.windows(2).all(|w| w[0].end() <= w[1].begin())
    }

    /// Persist every block under `folder`.
    pub fn save(&self, folder: &Path) -> Result<GridMeta> {
        storage::save_blocks(folder, self.granularity, &self.blocks)
    }

    /// Load a grid saved with [`save`](Self::save).
    pub fn load(folder: &Path, granularity: Granularity, opts: &LoadOptions) -> Result<Self> {
        Self::load_with_report(folder, granularity, opts).map(|(grid, _)| grid)
    }

    /// Like [`load`](Self::load), also returning which files were rejected.
    pub fn load_with_report(
        folder: &Path,
        granularity: Granularity,
        opts: &LoadOptions,
    ) -> Result<(Self, LoadReport)> {
        let (blocks, report) = storage::load_blocks(folder, granularity, opts)?;
        let grid = Self::from_blocks(granularity, blocks).map_err(|_| {
            CacheError::Corruption(format!(
                "blocks loaded from {} overlap each other",
                folder.display()
            ))
        })?;
        Ok((grid, report))
    }
}
