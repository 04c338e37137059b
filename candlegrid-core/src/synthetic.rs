//! Deterministic synthetic candles, for seeding a cache offline and for tests.
//!
//! Prices follow a smooth curve of time, so a candle's close always equals the
//! next candle's open. Wicks, volume and trade counts come from an RNG seeded
//! per candle slot with BLAKE3 over (symbol, granularity, open time): the same
//! slot yields the same candle no matter which range was requested.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

use crate::domain::{Candle, Granularity, TimeInterval};
use crate::error::Result;
use crate::fill::CandleSource;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    master_seed: u64,
}

impl SyntheticSource {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Candles of every slot overlapping `range`, aligned to the granularity.
    pub fn candles(
        &self,
        symbol: &str,
        granularity: Granularity,
        range: TimeInterval,
    ) -> Vec<Candle> {
        let mut out = Vec::new();
        if range.is_empty() {
            return out;
        }
        let base = self.base_price(symbol);
        let mut open_time = granularity.align_down(range.begin);
        while open_time < range.end {
            let close_time = granularity.advance(open_time);
            if close_time <= open_time {
                break;
            }
            out.push(self.candle(symbol, granularity, base, open_time, close_time));
            open_time = close_time;
        }
        out
    }

    fn candle(
        &self,
        symbol: &str,
        granularity: Granularity,
        base: f64,
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
    ) -> Candle {
        let mut rng = self.rng_for(symbol, granularity, open_time);
        let open = price_at(base, open_time);
        let close = price_at(base, close_time);
        let wick = base * 0.002;
        let high = open.max(close) + rng.gen_range(0.0..wick);
        let low = open.min(close) - rng.gen_range(0.0..wick);
        let volume = rng.gen_range(10.0..1_000.0);
        Candle {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
            quote_volume: volume * (open + close) / 2.0,
            trades: rng.gen_range(1..500),
        }
    }

    fn base_price(&self, symbol: &str) -> f64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        let bytes = hasher.finalize();
        let word = u16::from_le_bytes([bytes.as_bytes()[0], bytes.as_bytes()[1]]);
        10.0 + f64::from(word) / f64::from(u16::MAX) * 990.0
    }

    fn rng_for(&self, symbol: &str, granularity: Granularity, open_time: DateTime<Utc>) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(granularity.code().as_bytes());
        hasher.update(&open_time.timestamp_millis().to_le_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(42)
    }
}

impl CandleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        granularity: Granularity,
        range: TimeInterval,
    ) -> Result<Vec<Candle>> {
        Ok(self.candles(symbol, granularity, range))
    }
}

/// Two superimposed waves (monthly and ~4-day) around `base`.
fn price_at(base: f64, t: DateTime<Utc>) -> f64 {
    let days = t.timestamp() as f64 / SECONDS_PER_DAY;
    base * (1.0 + 0.10 * (TAU * days / 30.0).sin() + 0.03 * (TAU * days / 3.7).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::DataBlock;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn output_is_a_valid_block() {
        let source = SyntheticSource::default();
        for g in [Granularity::Minute15, Granularity::Hour4, Granularity::Day1] {
            let candles = source.candles("BTCUSDT", g, TimeInterval::new(day(1), day(8)));
            assert!(!candles.is_empty());
            assert!(candles.iter().all(Candle::is_sane));
            assert!(DataBlock::new(g, candles).is_ok());
        }
    }

    #[test]
    fn same_slot_same_candle_across_ranges() {
        let source = SyntheticSource::new(7);
        let wide = source.candles("ETHUSDT", Granularity::Hour1, TimeInterval::new(day(1), day(3)));
        let narrow = source.candles(
            "ETHUSDT",
            Granularity::Hour1,
            TimeInterval::new(day(2), day(2) + Duration::hours(5)),
        );
        assert_eq!(narrow.len(), 5);
        assert_eq!(narrow[..], wide[24..29]);
    }

    #[test]
    fn unaligned_range_is_widened_to_slots() {
        let source = SyntheticSource::default();
        let begin = day(1) + Duration::seconds(30);
        let candles = source.candles(
            "BTCUSDT",
            Granularity::Minute1,
            TimeInterval::new(begin, begin + Duration::minutes(2)),
        );
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].open_time, day(1));
    }

    #[test]
    fn monthly_candles_follow_the_calendar() {
        let source = SyntheticSource::default();
        let candles = source.candles(
            "BTCUSDT",
            Granularity::Month1,
            TimeInterval::new(day(15), Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
        );
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[1].open_time, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert!(DataBlock::new(Granularity::Month1, candles).is_ok());
    }

    #[test]
    fn symbols_differ() {
        let source = SyntheticSource::default();
        let range = TimeInterval::new(day(1), day(2));
        assert_ne!(
            source.candles("AAA", Granularity::Day1, range),
            source.candles("BBB", Granularity::Day1, range)
        );
    }
}
