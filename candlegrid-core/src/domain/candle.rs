//! Candle — one fixed-duration OHLCV bucket.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::interval::TimeInterval;

/// OHLCV candle for a single symbol over one granularity step.
///
/// `close_time` is the exclusive end of the bucket, so two consecutive
/// candles satisfy `prev.close_time == next.open_time`. Exchanges usually
/// report the inclusive close (`open + step - 1ms`); use
/// [`Candle::from_exchange`] to normalise those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades: u64,
}

impl Candle {
    /// Approximate in-memory cost of one candle, used for capacity reporting.
    pub const APPROX_SIZE_BYTES: usize = std::mem::size_of::<Candle>();

    /// Build a candle from an exchange row whose close time is inclusive.
    #[allow(clippy::too_many_arguments)]
    pub fn from_exchange(
        open_time_ms: i64,
        inclusive_close_ms: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        quote_volume: f64,
        trades: u64,
    ) -> Option<Self> {
        Some(Self {
            open_time: DateTime::from_timestamp_millis(open_time_ms)?,
            close_time: DateTime::from_timestamp_millis(inclusive_close_ms.checked_add(1)?)?,
            open,
            high,
            low,
            close,
            volume,
            quote_volume,
            trades,
        })
    }

    /// Duration covered by this candle.
    pub fn span(&self) -> Duration {
        self.close_time - self.open_time
    }

    pub fn interval(&self) -> TimeInterval {
        TimeInterval::new(self.open_time, self.close_time)
    }

    /// True if `next` starts exactly where this candle ends.
    pub fn is_adjacent_to(&self, next: &Candle) -> bool {
        self.close_time == next.open_time
    }

    /// Basic OHLC sanity check: high is the maximum, low the minimum.
    pub fn is_sane(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }
}
