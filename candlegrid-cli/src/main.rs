//! candlegrid CLI — inspect and maintain an on-disk candle cache.
//!
//! Commands:
//! - `status` — blocks, candles, time range and size per symbol/granularity
//! - `refine` — re-cut every block to at most `--block-size` candles
//! - `import` — append candles from a CSV file
//! - `export` — write a cached range as CSV, or report the missing gap
//! - `verify` — load every grid without touching it and check meta hashes
//! - `seed` — fill a range from the deterministic synthetic source

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use candlegrid_core::storage::{content_hash, GridMeta};
use candlegrid_core::{
    fill_range, BlockGrid, Cache, CacheConfig, Candle, Granularity, LoadOptions, Retrieval,
    SyntheticSource,
};

#[derive(Parser)]
#[command(
    name = "candlegrid",
    about = "candlegrid — gap-aware candle cache maintenance"
)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory. Overrides `root` from the config.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report blocks, candles, time range and size per grid.
    Status {
        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Re-cut every block to at most `block_size` candles and save.
    Refine {
        /// Target block size. Defaults to `block_size` from the config.
        #[arg(long)]
        block_size: Option<usize>,
    },
    /// Append candles from a CSV file (`-` for stdin).
    Import {
        symbol: String,
        granularity: Granularity,
        file: PathBuf,

        /// Close times in the file are inclusive (`open + step - 1ms`).
        #[arg(long, default_value_t = false)]
        inclusive_close: bool,
    },
    /// Write the candles of a cached range to stdout as CSV.
    Export {
        symbol: String,
        granularity: Granularity,

        /// Range start (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        start: String,

        /// Range end, exclusive (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        end: String,
    },
    /// Load every grid read-only and compare content against meta hashes.
    Verify,
    /// Fill a range from the deterministic synthetic source and save.
    Seed {
        symbol: String,
        granularity: Granularity,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Master seed of the synthetic source.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CacheConfig::from_file(path)?,
        None => CacheConfig::default(),
    };
    if let Some(dir) = cli.cache_dir {
        config.root = dir;
    }
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Status { json } => run_status(&config, json),
        Commands::Refine { block_size } => {
            run_refine(&config, block_size.unwrap_or(config.block_size))
        }
        Commands::Import {
            symbol,
            granularity,
            file,
            inclusive_close,
        } => run_import(&config, &symbol, granularity, &file, inclusive_close),
        Commands::Export {
            symbol,
            granularity,
            start,
            end,
        } => run_export(&config, &symbol, granularity, &start, &end),
        Commands::Verify => run_verify(&config),
        Commands::Seed {
            symbol,
            granularity,
            start,
            end,
            seed,
        } => run_seed(&config, &symbol, granularity, &start, &end, seed),
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
            }),
        )
        .with_writer(io::stderr)
        .init();
}

// ── Commands ─────────────────────────────────────────────────────────

const READ_ONLY: LoadOptions = LoadOptions {
    quarantine_corrupt: false,
};

fn run_status(config: &CacheConfig, json: bool) -> Result<()> {
    let root = &config.root;
    if !root.exists() {
        println!("Cache directory does not exist: {}", root.display());
        return Ok(());
    }

    let (cache, report) = Cache::load(root, &READ_ONLY)?;
    let stats = cache.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    if stats.is_empty() {
        println!("Cache is empty: {}", root.display());
        return Ok(());
    }

    let disk: u64 = stats
        .iter()
        .map(|(symbol, s)| dir_size(&grid_dir(root, symbol, s.granularity)))
        .sum();

    println!("Cache: {}", root.display());
    println!("Symbols: {}", cache.symbols().len());
    println!("In memory: {}", format_size(cache.approx_size_bytes() as u64));
    println!("On disk: {}", format_size(disk));
    if !report.rejected.is_empty() {
        println!("Unreadable block files: {}", report.rejected.len());
    }
    println!();
    println!(
        "{:<12} {:<5} {:>7} {:>10}  {:<43} {:>10}",
        "Symbol", "Gran", "Blocks", "Candles", "Range", "Size"
    );
    println!("{}", "-".repeat(94));
    for (symbol, s) in &stats {
        let range = match (s.begin, s.end) {
            (Some(b), Some(e)) => format!(
                "{} to {}",
                b.format("%Y-%m-%d %H:%M"),
                e.format("%Y-%m-%d %H:%M")
            ),
            _ => "(empty)".to_string(),
        };
        println!(
            "{:<12} {:<5} {:>7} {:>10}  {:<43} {:>10}",
            symbol,
            s.granularity.code(),
            s.blocks,
            s.candles,
            range,
            format_size(s.approx_size_bytes as u64)
        );
    }
    Ok(())
}

fn run_refine(config: &CacheConfig, block_size: usize) -> Result<()> {
    if block_size == 0 {
        bail!("--block-size must be at least 1");
    }
    let (cache, _) = Cache::load(&config.root, &config.load_options())?;
    let before: usize = cache.stats().iter().map(|(_, s)| s.blocks).sum();
    cache.refine_all(block_size);
    cache.save(&config.root)?;
    let after: usize = cache.stats().iter().map(|(_, s)| s.blocks).sum();

    println!(
        "Refined {} to blocks of at most {block_size} candles: {before} -> {after} blocks",
        config.root.display()
    );
    Ok(())
}

fn run_import(
    config: &CacheConfig,
    symbol: &str,
    granularity: Granularity,
    file: &Path,
    inclusive_close: bool,
) -> Result<()> {
    let mut input = String::new();
    if file == Path::new("-") {
        io::stdin().read_to_string(&mut input)?;
    } else {
        input = std::fs::read_to_string(file)
            .with_context(|| format!("read {}", file.display()))?;
    }

    let mut candles = parse_candles(input.as_bytes(), inclusive_close)?;
    candles.sort_by_key(|c| c.open_time);
    let count = candles.len();

    let dir = config.root.join(symbol).join(granularity.dir_name());
    let mut grid = BlockGrid::load(&dir, granularity, &config.load_options())?;
    grid.append(candles)
        .with_context(|| format!("append {symbol} {granularity} from {}", file.display()))?;
    grid.refine(config.block_size);
    let meta = grid.save(&dir)?;

    println!(
        "Imported {count} candles into {symbol} {granularity}: {} blocks, {} candles",
        meta.block_count, meta.candle_count
    );
    Ok(())
}

fn run_export(
    config: &CacheConfig,
    symbol: &str,
    granularity: Granularity,
    start: &str,
    end: &str,
) -> Result<()> {
    let (begin, end) = (parse_time(start)?, parse_time(end)?);
    let dir = config.root.join(symbol).join(granularity.dir_name());
    let grid = BlockGrid::load(&dir, granularity, &READ_ONLY)?;

    match grid.retrieve(begin, end) {
        Retrieval::Hit(candles) => {
            let mut writer = csv::Writer::from_writer(io::stdout().lock());
            for candle in &candles {
                writer.serialize(candle)?;
            }
            writer.flush()?;
            tracing::info!(symbol, %granularity, candles = candles.len(), "exported");
            Ok(())
        }
        Retrieval::Gap(gap) => {
            bail!("{symbol} {granularity} is not cached for [{begin}, {end}); missing {gap}")
        }
    }
}

fn run_verify(config: &CacheConfig) -> Result<()> {
    let root = &config.root;
    let (cache, report) = Cache::load(root, &READ_ONLY)?;
    let mut problems = report.rejected.len();

    for (path, reason) in &report.rejected {
        println!("CORRUPT  {}: {reason}", path.display());
    }

    for symbol in cache.symbols() {
        let Some(asset) = cache.get(&symbol) else {
            continue;
        };
        for granularity in asset.granularities() {
            let dir = grid_dir(root, &symbol, granularity);
            let grid = asset.grid(granularity);
            let hash = content_hash(grid.read().blocks())?;
            match GridMeta::read(&dir) {
                Some(meta) if meta.data_hash == hash => {
                    println!("OK       {symbol} {granularity}");
                }
                Some(_) => {
                    problems += 1;
                    println!("MISMATCH {symbol} {granularity}: content differs from meta.json");
                }
                None => println!("NO META  {symbol} {granularity}"),
            }
        }
    }

    if problems > 0 {
        bail!("{problems} problem(s) found under {}", root.display());
    }
    Ok(())
}

fn run_seed(
    config: &CacheConfig,
    symbol: &str,
    granularity: Granularity,
    start: &str,
    end: &str,
    seed: u64,
) -> Result<()> {
    let (begin, end) = (parse_time(start)?, parse_time(end)?);
    let (cache, _) = Cache::load(&config.root, &config.load_options())?;
    let asset = cache.asset(symbol);

    let report = fill_range(
        &asset,
        granularity,
        begin,
        end,
        &SyntheticSource::new(seed),
        config.max_fill_rounds,
    )?;
    asset.refine(config.block_size);
    asset.save(&config.root.join(symbol))?;

    println!(
        "Seeded {symbol} {granularity}: {} candles in range, {} fetched in {} round(s)",
        report.candles.len(),
        report.fetched,
        report.rounds
    );
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

/// One CSV row; times are epoch milliseconds.
#[derive(Debug, Deserialize)]
struct CsvRow {
    open_time: i64,
    close_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    quote_volume: f64,
    #[serde(default)]
    trades: u64,
}

fn parse_candles<R: Read>(reader: R, inclusive_close: bool) -> Result<Vec<Candle>> {
    let mut candles = Vec::new();
    for (line, row) in csv::Reader::from_reader(reader).deserialize::<CsvRow>().enumerate() {
        let row = row.with_context(|| format!("CSV row {}", line + 1))?;
        let close_ms = if inclusive_close {
            row.close_time
        } else {
            row.close_time
                .checked_sub(1)
                .with_context(|| format!("CSV row {}: close_time out of range", line + 1))?
        };
        let candle = Candle::from_exchange(
            row.open_time,
            close_ms,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
            row.quote_volume,
            row.trades,
        )
        .with_context(|| format!("CSV row {}: timestamp out of range", line + 1))?;
        candles.push(candle);
    }
    Ok(candles)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid time '{s}' (expected YYYY-MM-DD or RFC 3339)"))?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .context("midnight is always valid")?
        .and_utc())
}

fn grid_dir(root: &Path, symbol: &str, granularity: Granularity) -> PathBuf {
    root.join(symbol).join(granularity.dir_name())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_dates_and_rfc3339() {
        assert_eq!(
            parse_time("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time("2024-03-01T12:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
        );
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn csv_close_times_are_normalised() {
        let exclusive = "open_time,close_time,open,high,low,close,volume\n\
                         0,60000,1,2,0.5,1.5,10\n\
                         60000,120000,1.5,2,1,1.8,12\n";
        let inclusive = "open_time,close_time,open,high,low,close,volume,quote_volume,trades\n\
                         0,59999,1,2,0.5,1.5,10,15,3\n";

        let a = parse_candles(exclusive.as_bytes(), false).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].close_time, a[1].open_time);
        assert_eq!(a[0].trades, 0);

        let b = parse_candles(inclusive.as_bytes(), true).unwrap();
        assert_eq!(b[0].close_time.timestamp_millis(), 60_000);
        assert_eq!(b[0].trades, 3);
    }

    #[test]
    fn bad_row_is_reported() {
        let input = "open_time,close_time,open,high,low,close,volume\n0,x,1,1,1,1,1\n";
        let err = parse_candles(input.as_bytes(), false).unwrap_err();
        assert!(format!("{err:#}").contains("CSV row 1"));
    }

    #[test]
    fn minimal_close_time_is_reported_not_wrapped() {
        let input = format!(
            "open_time,close_time,open,high,low,close,volume\n0,{},1,1,1,1,1\n",
            i64::MIN
        );
        let err = parse_candles(input.as_bytes(), false).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("CSV row 1"));
        assert!(msg.contains("close_time out of range"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "candlegrid",
            "--cache-dir",
            "/tmp/c",
            "export",
            "BTCUSDT",
            "1h",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-02",
        ])
        .unwrap();
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert!(matches!(
            cli.command,
            Commands::Export {
                granularity: Granularity::Hour1,
                ..
            }
        ));
    }

    #[test]
    fn import_then_export_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("in.csv");
        std::fs::write(
            &csv_path,
            "open_time,close_time,open,high,low,close,volume\n\
             0,60000,1,2,0.5,1.5,10\n\
             60000,120000,1.5,2,1,1.8,12\n",
        )
        .unwrap();
        let config = CacheConfig {
            root: dir.path().join("cache"),
            ..CacheConfig::default()
        };

        run_import(&config, "TEST", Granularity::Minute1, &csv_path, false).unwrap();
        let grid = BlockGrid::load(
            &config.root.join("TEST").join("1m"),
            Granularity::Minute1,
            &READ_ONLY,
        )
        .unwrap();
        assert_eq!(grid.candle_count(), 2);
        run_verify(&config).unwrap();
    }
}
