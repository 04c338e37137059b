//! Save/load through the filesystem: grids, quarantine and whole-cache trees.

use candlegrid_core::storage::{decode_range, GridMeta, QUARANTINE_EXTENSION};
use candlegrid_core::{
    BlockGrid, Cache, CacheError, Candle, Granularity, LoadOptions, SyntheticSource, TimeInterval,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use std::path::Path;

fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

fn synthetic(start: i64, stop: i64) -> Vec<Candle> {
    SyntheticSource::default().candles(
        "BTCUSDT",
        Granularity::Minute1,
        TimeInterval::new(t(start), t(stop)),
    )
}

fn parquet_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".parquet"))
        .collect();
    names.sort();
    names
}

#[test]
fn grid_roundtrip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid = BlockGrid::new(Granularity::Minute1);
    grid.append(synthetic(0, 300)).unwrap();
    grid.append(synthetic(400, 450)).unwrap();
    grid.refine(64);

    let meta = grid.save(dir.path()).unwrap();
    assert_eq!(meta.block_count, grid.len());
    assert_eq!(meta.candle_count, 350);

    let loaded =
        BlockGrid::load(dir.path(), Granularity::Minute1, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.blocks(), grid.blocks());
    assert_eq!(loaded.begin(), grid.begin());
    assert_eq!(loaded.end(), grid.end());
}

#[test]
fn millisecond_offsets_survive_a_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let shifted: Vec<Candle> = synthetic(0, 3)
        .into_iter()
        .map(|c| Candle {
            open_time: c.open_time + Duration::milliseconds(250),
            close_time: c.close_time + Duration::milliseconds(250),
            ..c
        })
        .collect();
    let mut grid = BlockGrid::new(Granularity::Minute1);
    grid.append(shifted).unwrap();
    grid.save(dir.path()).unwrap();

    let loaded =
        BlockGrid::load(dir.path(), Granularity::Minute1, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.blocks(), grid.blocks());
    assert_eq!(loaded.begin(), t(0) + Duration::milliseconds(250));
}

#[test]
fn sub_millisecond_candles_never_reach_disk() {
    let mut grid = BlockGrid::new(Granularity::Minute1);
    grid.append(synthetic(10, 20)).unwrap();

    let shifted: Vec<Candle> = synthetic(0, 3)
        .into_iter()
        .map(|c| Candle {
            open_time: c.open_time + Duration::microseconds(500),
            close_time: c.close_time + Duration::microseconds(500),
            ..c
        })
        .collect();
    let err = grid.append(shifted).unwrap_err();
    assert!(err.is_integrity_fault());
    assert_eq!(grid.len(), 1);
    assert_eq!(grid.begin(), t(10));
}

#[test]
fn file_names_encode_block_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid = BlockGrid::new(Granularity::Minute1);
    grid.append(synthetic(0, 30)).unwrap();
    grid.save(dir.path()).unwrap();

    let names = parquet_files(dir.path());
    assert_eq!(names.len(), 1);
    let stem = names[0].trim_end_matches(".parquet");
    assert_eq!(decode_range(stem), Some(TimeInterval::new(t(0), t(30))));
}

#[test]
fn meta_hash_tracks_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid = BlockGrid::new(Granularity::Minute1);
    grid.append(synthetic(0, 30)).unwrap();
    let first = grid.save(dir.path()).unwrap();
    assert_eq!(GridMeta::read(dir.path()).unwrap().data_hash, first.data_hash);

    grid.append(synthetic(30, 31)).unwrap();
    let second = grid.save(dir.path()).unwrap();
    assert_ne!(first.data_hash, second.data_hash);
}

#[test]
fn corrupt_file_is_skipped_and_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid = BlockGrid::new(Granularity::Minute1);
    grid.append(synthetic(0, 30)).unwrap();
    grid.append(synthetic(60, 90)).unwrap();
    grid.save(dir.path()).unwrap();

    let victim = dir.path().join(&parquet_files(dir.path())[1]);
    fs::write(&victim, b"truncated").unwrap();

    let (loaded, report) =
        BlockGrid::load_with_report(dir.path(), Granularity::Minute1, &LoadOptions::default())
            .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(report.rejected.len(), 1);
    assert!(!victim.exists());
    let mut quarantined = victim.into_os_string();
    quarantined.push(format!(".{QUARANTINE_EXTENSION}"));
    assert!(Path::new(&quarantined).exists());
}

#[test]
fn quarantine_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("0000000000000000-0000000000000001.parquet"), b"x").unwrap();

    let opts = LoadOptions {
        quarantine_corrupt: false,
    };
    let (_, report) = BlockGrid::load_with_report(dir.path(), Granularity::Minute1, &opts).unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(parquet_files(dir.path()).len(), 1);
}

#[test]
fn overlapping_survivors_fail_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut a = BlockGrid::new(Granularity::Minute1);
    a.append(synthetic(0, 30)).unwrap();
    a.save(dir.path()).unwrap();

    // A second, overlapping block written by hand next to the first one.
    let other = tempfile::tempdir().unwrap();
    let mut b = BlockGrid::new(Granularity::Minute1);
    b.append(synthetic(20, 40)).unwrap();
    b.save(other.path()).unwrap();
    let name = &parquet_files(other.path())[0];
    fs::copy(other.path().join(name), dir.path().join(name)).unwrap();

    let err =
        BlockGrid::load(dir.path(), Granularity::Minute1, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, CacheError::Corruption(_)));
}

#[test]
fn cache_tree_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new();
    let source = SyntheticSource::new(1);
    for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        for g in [Granularity::Minute5, Granularity::Hour1] {
            let range = TimeInterval::new(t(0), t(24 * 60));
            cache.append(symbol, g, source.candles(symbol, g, range)).unwrap();
        }
    }
    cache.save(dir.path()).unwrap();

    let (loaded, report) = Cache::load(dir.path(), &LoadOptions::default()).unwrap();
    assert!(report.rejected.is_empty());
    assert_eq!(loaded.symbols(), cache.symbols());
    assert_eq!(loaded.stats(), cache.stats());
    assert_eq!(loaded.approx_size_bytes(), cache.approx_size_bytes());
}
