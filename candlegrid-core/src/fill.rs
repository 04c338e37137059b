//! Fill loop: retrieve → fetch the reported gap → append → retrieve again.
//!
//! The cache never talks to the network itself. A [`CandleSource`] is the
//! seam where an exchange client, a CSV importer or the synthetic generator
//! plugs in.

use chrono::{DateTime, Utc};

use crate::asset::AssetView;
use crate::domain::{Candle, Granularity, TimeInterval};
use crate::error::{CacheError, Result};

/// Anything that can produce candles for a time range.
pub trait CandleSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the candles of `symbol` covering `range`, ordered and contiguous.
    fn fetch(
        &self,
        symbol: &str,
        granularity: Granularity,
        range: TimeInterval,
    ) -> Result<Vec<Candle>>;
}

/// What a successful fill did.
#[derive(Debug, Clone, PartialEq)]
pub struct FillReport {
    pub candles: Vec<Candle>,
    /// Number of fetches issued.
    pub rounds: usize,
    pub fetched: usize,
}

/// Make `[begin, end)` of `granularity` fully cached in `asset`, fetching
/// missing ranges from `source`, and return the covering candles.
///
/// Every fetch is the reported gap intersected with the (zero-time clamped)
/// request. A fetch that returns nothing, a gap that does not shrink, or more
/// than `max_rounds` fetches end the loop with [`CacheError::NoProgress`].
pub fn fill_range(
    asset: &AssetView,
    granularity: Granularity,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    source: &dyn CandleSource,
    max_rounds: usize,
) -> Result<FillReport> {
    let request = TimeInterval::new(begin.max(asset.zero_time()), end);
    let mut rounds = 0;
    let mut fetched = 0;
    let mut previous_gap: Option<TimeInterval> = None;

    let no_progress = |rounds| CacheError::NoProgress {
        symbol: asset.symbol().to_string(),
        granularity,
        begin,
        end,
        rounds,
    };

    loop {
        let gap = match asset.retrieve(granularity, begin, end) {
            crate::grid::Retrieval::Hit(candles) => {
                tracing::debug!(
                    symbol = asset.symbol(),
                    %granularity,
                    rounds,
                    fetched,
                    "range filled"
                );
                return Ok(FillReport {
                    candles,
                    rounds,
                    fetched,
                });
            }
            crate::grid::Retrieval::Gap(gap) => gap,
        };

        if rounds >= max_rounds || previous_gap == Some(gap) {
            return Err(no_progress(rounds));
        }

        let wanted = gap.intersection(&request);
        if wanted.is_empty() {
            return Err(no_progress(rounds));
        }

        tracing::debug!(
            symbol = asset.symbol(),
            source = source.name(),
            %granularity,
            gap = %wanted,
            "fetching gap"
        );
        let candles = source.fetch(asset.symbol(), granularity, wanted)?;
        rounds += 1;
        if candles.is_empty() {
            return Err(no_progress(rounds));
        }
        fetched += candles.len();
        asset.append(granularity, candles)?;
        previous_gap = Some(gap);
    }
}
