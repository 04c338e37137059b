//! Many threads appending, refining and reading the same cache.

use candlegrid_core::{Cache, Candle, Granularity, SyntheticSource, TimeInterval};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use std::thread;

fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

fn chunk(symbol: &str, start: i64, stop: i64) -> Vec<Candle> {
    SyntheticSource::default().candles(
        symbol,
        Granularity::Minute1,
        TimeInterval::new(t(start), t(stop)),
    )
}

#[test]
fn interleaved_chunks_converge_to_one_block() {
    let cache = Arc::new(Cache::new());
    let writers: Vec<_> = (0..16)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                // Overlapping chunks, appended in scrambled order.
                let start = ((i * 7) % 16) * 50;
                cache
                    .append("BTCUSDT", Granularity::Minute1, chunk("BTCUSDT", start, start + 60))
                    .unwrap();
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let grid = cache.asset("BTCUSDT").grid(Granularity::Minute1);
    let stats = grid.stats();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.candles, 15 * 50 + 60);
    assert_eq!(
        grid.retrieve(t(0), t(810)).into_candles().unwrap(),
        chunk("BTCUSDT", 0, 810)
    );
}

#[test]
fn readers_never_observe_a_torn_grid() {
    let cache = Arc::new(Cache::new());
    cache
        .append("ETHUSDT", Granularity::Minute1, chunk("ETHUSDT", 0, 100))
        .unwrap();

    let writer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for round in 1..20 {
                let start = round * 100;
                cache
                    .append("ETHUSDT", Granularity::Minute1, chunk("ETHUSDT", start, start + 100))
                    .unwrap();
                cache.refine_all(37);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..200 {
                    let candles = cache
                        .retrieve("ETHUSDT", Granularity::Minute1, t(0), t(100))
                        .into_candles()
                        .unwrap();
                    assert_eq!(candles.len(), 100);
                    let grid = cache.asset("ETHUSDT").grid(Granularity::Minute1);
                    assert!(grid.read().blocks_are_ordered());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(
        cache
            .retrieve("ETHUSDT", Granularity::Minute1, t(0), t(2000))
            .into_candles()
            .map(|c| c.len()),
        Some(2000)
    );
}

#[test]
fn appends_are_visible_after_return() {
    let cache = Arc::new(Cache::new());
    let handle = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache
                .append("SOLUSDT", Granularity::Minute1, chunk("SOLUSDT", 0, 10))
                .unwrap();
        })
    };
    handle.join().unwrap();
    assert!(cache
        .retrieve("SOLUSDT", Granularity::Minute1, t(0), t(10))
        .is_hit());
}
