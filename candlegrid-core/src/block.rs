//! DataBlock — a maximal gap-free run of candles of one granularity.
//!
//! Contiguity invariant: every candle spans the granularity (within its
//! tolerance) and every consecutive pair satisfies
//! `prev.close_time == next.open_time`. Constructors validate it; every
//! mutation preserves it or fails without touching the block.

use chrono::{DateTime, Utc};

use crate::domain::{Candle, Granularity, TimeInterval};
use crate::error::{CacheError, Result};
use crate::search::{lower_bound_by_key, upper_bound_by_key};

#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    granularity: Granularity,
    candles: Vec<Candle>,
}

impl DataBlock {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            candles: Vec::new(),
        }
    }

    /// Build a block from ordered candles, validating contiguity.
    pub fn new(granularity: Granularity, candles: Vec<Candle>) -> Result<Self> {
        validate(granularity, &candles)?;
        Ok(Self {
            granularity,
            candles,
        })
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Open time of the first candle, or max time when empty.
    pub fn begin(&self) -> DateTime<Utc> {
        self.candles
            .first()
            .map_or(DateTime::<Utc>::MAX_UTC, |c| c.open_time)
    }

    /// Close time of the last candle, or min time when empty.
    pub fn end(&self) -> DateTime<Utc> {
        self.candles
            .last()
            .map_or(DateTime::<Utc>::MIN_UTC, |c| c.close_time)
    }

    pub fn interval(&self) -> TimeInterval {
        TimeInterval::new(self.begin(), self.end())
    }

    pub fn approx_size_bytes(&self) -> usize {
        self.candles.len() * Candle::APPROX_SIZE_BYTES
    }

    // ── Relations ────────────────────────────────────────────────────

    pub fn contains(&self, other: &DataBlock) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.begin() <= other.begin()
            && other.end() <= self.end()
    }

    /// Open overlap; touching blocks do not intersect.
    pub fn intersects(&self, other: &DataBlock) -> bool {
        self.interval().intersects(&other.interval())
    }

    pub fn is_adjacent_and_preceding_to(&self, other: &DataBlock) -> bool {
        !self.is_empty() && !other.is_empty() && self.end() == other.begin()
    }

    pub fn is_adjacent_and_following_to(&self, other: &DataBlock) -> bool {
        other.is_adjacent_and_preceding_to(self)
    }

    pub fn is_adjacent_to(&self, other: &DataBlock) -> bool {
        self.is_adjacent_and_preceding_to(other) || self.is_adjacent_and_following_to(other)
    }

    pub fn coincide(&self, other: &DataBlock) -> bool {
        self.contains(other) && other.contains(self)
    }

    pub fn can_be_merged_with(&self, other: &DataBlock) -> bool {
        self.granularity == other.granularity
            && (self.is_adjacent_to(other) || self.intersects(other))
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Index of the candle opening at `candle.open_time`.
    pub fn find_item(&self, candle: &Candle) -> Option<usize> {
        self.candles
            .binary_search_by_key(&candle.open_time, |c| c.open_time)
            .ok()
    }

    /// Index of the last candle whose open time is `<= t`.
    pub fn find_begin_kline_id(&self, t: DateTime<Utc>) -> Option<usize> {
        upper_bound_by_key(&self.candles, &t, |c| c.open_time).checked_sub(1)
    }

    /// Index of the first candle whose close time is `>= t`, or `len()`.
    pub fn find_end_kline_id(&self, t: DateTime<Utc>) -> usize {
        lower_bound_by_key(&self.candles, &t, |c| c.close_time)
    }

    /// Candles overlapping `[begin, end)`, widened to candle boundaries.
    pub fn slice(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> &[Candle] {
        if begin >= end || begin >= self.end() || end <= self.begin() {
            return &[];
        }
        let start = self.find_begin_kline_id(begin).unwrap_or(0);
        let stop = (self.find_end_kline_id(end) + 1).min(self.candles.len());
        &self.candles[start..stop]
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Remove the part of `self` overlapping `other`.
    ///
    /// Fails when `other` lies strictly inside `self`: a block cannot hold
    /// the two pieces that would remain.
    pub fn subtract(&mut self, other: &DataBlock) -> Result<&mut Self> {
        self.subtract_interval(&other.interval())
    }

    pub fn subtract_interval(&mut self, other: &TimeInterval) -> Result<&mut Self> {
        if self.is_empty() || !self.interval().intersects(other) {
            return Ok(self);
        }
        if other.begin <= self.begin() && other.end >= self.end() {
            self.candles.clear();
            return Ok(self);
        }
        if other.begin > self.begin() && other.end < self.end() {
            return Err(CacheError::InvalidMerge(format!(
                "subtracting {other} from {} would split the block in two",
                self.interval()
            )));
        }

        if other.begin > self.begin() {
            let keep = self.candles.partition_point(|c| c.close_time <= other.begin);
            self.candles.truncate(keep);
        } else {
            let drop = self.candles.partition_point(|c| c.open_time < other.end);
            self.candles.drain(..drop);
        }
        Ok(self)
    }

    /// Merge `other` into `self`; `other` wins every overlapping slot.
    pub fn merge_overwrite(&mut self, other: &DataBlock) -> Result<&mut Self> {
        self.check_mergeable(other)?;
        if other.is_empty() {
            return Ok(self);
        }
        if self.is_empty() {
            self.candles = other.candles.clone();
            return Ok(self);
        }

        if self.contains(other) {
            let start = self.find_item(&other.candles[0]).ok_or_else(|| {
                CacheError::InvalidMerge(format!(
                    "candles of {} are not aligned with {}",
                    other.interval(),
                    self.interval()
                ))
            })?;
            let stop = start + other.len();
            if stop > self.candles.len() || self.candles[stop - 1].close_time != other.end() {
                return Err(CacheError::InvalidMerge(format!(
                    "candles of {} are not aligned with {}",
                    other.interval(),
                    self.interval()
                )));
            }
            self.candles[start..stop].clone_from_slice(&other.candles);
            return Ok(self);
        }

        let mut rest = self.copy();
        rest.subtract(other)?;
        let merged = if rest.is_empty() {
            other.candles.clone()
        } else if rest.is_adjacent_and_following_to(other) {
            concat(&other.candles, &rest.candles)
        } else if rest.is_adjacent_and_preceding_to(other) {
            concat(&rest.candles, &other.candles)
        } else {
            return Err(CacheError::InvalidMerge(format!(
                "candle boundaries of {} and {} are not aligned",
                self.interval(),
                other.interval()
            )));
        };
        self.candles = merged;
        Ok(self)
    }

    /// Merge `other` into `self`; `self` wins every overlapping slot and
    /// only the parts of `other` outside `self`'s extent are spliced in.
    pub fn merge_preserve(&mut self, other: &DataBlock) -> Result<&mut Self> {
        self.check_mergeable(other)?;
        if other.is_empty() {
            return Ok(self);
        }
        if self.is_empty() {
            self.candles = other.candles.clone();
            return Ok(self);
        }

        let (begin, end) = (self.begin(), self.end());
        let left_len = other.candles.partition_point(|c| c.open_time < begin);
        let right_start = other.candles.partition_point(|c| c.close_time <= end);
        let left = &other.candles[..left_len];
        let right = &other.candles[right_start.max(left_len)..];

        let misaligned = left.last().is_some_and(|c| c.close_time != begin)
            || right.first().is_some_and(|c| c.open_time != end);
        if misaligned {
            return Err(CacheError::InvalidMerge(format!(
                "candle boundaries of {} and {} are not aligned",
                self.interval(),
                other.interval()
            )));
        }
        if left.is_empty() && right.is_empty() {
            return Ok(self);
        }

        let mut merged = Vec::with_capacity(left.len() + self.candles.len() + right.len());
        merged.extend_from_slice(left);
        merged.append(&mut self.candles);
        merged.extend_from_slice(right);
        self.candles = merged;
        Ok(self)
    }

    /// Cut into `⌈len / target⌉` pieces of at most `target` candles; only the
    /// last piece may be shorter. A `target` of zero is treated as one.
    pub fn split(&self, target: usize) -> Vec<DataBlock> {
        let target = target.max(1);
        let mut pieces = Vec::with_capacity(self.len().div_ceil(target).max(1));
        split_into(self.granularity, &self.candles, target, &mut pieces);
        pieces
    }

    /// Independent copy of this block.
    pub fn copy(&self) -> DataBlock {
        if self.is_empty() {
            return DataBlock::empty(self.granularity);
        }
        self.clone()
    }

    /// Re-check the contiguity invariant.
    pub fn is_valid(&self) -> bool {
        validate(self.granularity, &self.candles).is_ok()
    }

    fn check_mergeable(&self, other: &DataBlock) -> Result<()> {
        if self.granularity != other.granularity {
            return Err(CacheError::InvalidMerge(format!(
                "granularity mismatch: {} vs {}",
                self.granularity, other.granularity
            )));
        }
        if self.is_empty() || other.is_empty() || self.can_be_merged_with(other) {
            return Ok(());
        }
        Err(CacheError::InvalidMerge(format!(
            "{} and {} are neither adjacent nor intersecting",
            self.interval(),
            other.interval()
        )))
    }
}

/// Check the contiguity invariant over an ordered candle run.
pub fn validate(granularity: Granularity, candles: &[Candle]) -> Result<()> {
    for (index, candle) in candles.iter().enumerate() {
        if !is_whole_millis(candle.open_time) || !is_whole_millis(candle.close_time) {
            return Err(CacheError::integrity(
                index,
                format!("candle at {} has sub-millisecond precision", candle.open_time),
            ));
        }
        if !granularity.accepts_span(candle.span()) {
            return Err(CacheError::integrity(
                index,
                format!(
                    "candle at {} spans {}s, expected {granularity}",
                    candle.open_time,
                    candle.span().num_seconds()
                ),
            ));
        }
        if index == 0 {
            continue;
        }
        let prev = &candles[index - 1];
        if prev.close_time < candle.open_time {
            return Err(CacheError::integrity(
                index,
                format!("gap between {} and {}", prev.close_time, candle.open_time),
            ));
        }
        if prev.close_time > candle.open_time {
            return Err(CacheError::integrity(
                index,
                format!("overlap between {} and {}", prev.close_time, candle.open_time),
            ));
        }
    }
    Ok(())
}

/// Stored times have millisecond resolution.
fn is_whole_millis(time: DateTime<Utc>) -> bool {
    time.timestamp_subsec_nanos() % 1_000_000 == 0
}

fn concat(left: &[Candle], right: &[Candle]) -> Vec<Candle> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    out.extend_from_slice(left);
    out.extend_from_slice(right);
    out
}

fn split_into(
    granularity: Granularity,
    candles: &[Candle],
    target: usize,
    out: &mut Vec<DataBlock>,
) {
    if candles.len() <= target {
        out.push(DataBlock {
            granularity,
            candles: candles.to_vec(),
        });
        return;
    }
    let pieces = candles.len().div_ceil(target);
    let (left, right) = candles.split_at((pieces / 2) * target);
    split_into(granularity, left, target, out);
    split_into(granularity, right, target, out);
}
