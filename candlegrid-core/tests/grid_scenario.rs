//! The reference two-block scenario, end to end through the public API.
//!
//! Minute candles on 2000-01-01: block A covers [00:00, 00:15), block B
//! covers [00:20, 00:42), leaving a five-minute hole.

use candlegrid_core::{BlockGrid, Candle, Granularity, Retrieval, TimeInterval};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

fn minutes(start: i64, stop: i64) -> Vec<Candle> {
    (start..stop)
        .map(|m| {
            let price = 100.0 + m as f64;
            Candle {
                open_time: t(m),
                close_time: t(m + 1),
                open: price,
                high: price + 0.5,
                low: price - 0.5,
                close: price + 0.25,
                volume: 10.0,
                quote_volume: 10.0 * price,
                trades: 3,
            }
        })
        .collect()
}

fn scenario_grid() -> BlockGrid {
    let mut grid = BlockGrid::new(Granularity::Minute1);
    grid.append(minutes(0, 15)).unwrap();
    grid.append(minutes(20, 42)).unwrap();
    grid
}

#[test]
fn hit_inside_first_block() {
    let grid = scenario_grid();
    let candles = grid.retrieve(t(0), t(10)).into_candles().unwrap();
    assert_eq!(candles.len(), 10);
    assert_eq!(candles[0].open_time, t(0));
    assert_eq!(candles[9].close_time, t(10));
}

#[test]
fn gap_is_the_hole_not_the_request() {
    let grid = scenario_grid();
    let hole = TimeInterval::new(t(15), t(20));

    assert_eq!(grid.retrieve(t(10), t(25)), Retrieval::Gap(hole));
    assert_eq!(grid.retrieve(t(0), t(42)), Retrieval::Gap(hole));
}

#[test]
fn filling_the_hole_makes_the_full_range_available() {
    let mut grid = scenario_grid();
    grid.append(minutes(15, 20)).unwrap();

    let candles = grid.retrieve(t(0), t(42)).into_candles().unwrap();
    assert_eq!(candles.len(), 42);
    for pair in candles.windows(2) {
        assert!(pair[0].is_adjacent_to(&pair[1]));
    }
    assert_eq!(grid.len(), 1);
}

#[test]
fn hit_and_gap_are_exclusive() {
    let grid = scenario_grid();
    for (b, e) in [(0, 10), (10, 25), (0, 42), (21, 41), (-5, 3), (40, 50)] {
        let result = grid.retrieve(t(b), t(e));
        assert_ne!(result.candles().is_some(), result.gap().is_some());
    }
}
