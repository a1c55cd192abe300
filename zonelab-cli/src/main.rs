//! ZoneLab CLI: supply/demand zone scanning commands.
//!
//! Commands:
//! - `scan`: detect and evaluate zones on one symbol and timeframe
//! - `correlate`: nest lower-timeframe zones inside higher-timeframe zones
//! - `batch`: run a symbol universe on a worker pool and save artifacts
//! - `presets`: list named threshold presets or print one as TOML

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zonelab_core::{ChildSeries, Direction, ZoneConfig, ZonePreset};
use zonelab_runner::{
    append_zones_csv, export_zones_csv, latest_zone_per_symbol, load_symbols, nifty50, run_symbol,
    save_batch, BatchProgress, BatchReport, BatchRunner, CandleSource, CsvDirSource, ScanMode,
    SymbolReport, SyntheticSource, Timeframe,
};

#[derive(Parser)]
#[command(
    name = "zonelab",
    version,
    about = "ZoneLab CLI: supply/demand zone scanner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect zones on one symbol and evaluate their status.
    Scan {
        /// Symbol (e.g., RELIANCE.NS).
        #[arg(long)]
        symbol: String,

        /// Candle timeframe: 15m, 1h, 1d, 1wk, 1mo.
        #[arg(long, default_value = "1d")]
        timeframe: Timeframe,

        /// Print zones as JSON instead of CSV.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        zone: ZoneArgs,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Find lower-timeframe zones inside higher-timeframe zones on one symbol.
    Correlate {
        /// Symbol (e.g., RELIANCE.NS).
        #[arg(long)]
        symbol: String,

        /// Higher (parent) timeframe.
        #[arg(long, default_value = "1mo")]
        higher: Timeframe,

        /// Lower (child) timeframe.
        #[arg(long, default_value = "1d")]
        lower: Timeframe,

        /// Print zones as JSON instead of CSV.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        zone: ZoneArgs,

        #[command(flatten)]
        data: DataArgs,
    },
    /// Scan a universe of symbols and save zones.csv, summary.csv, manifest.json.
    Batch {
        /// Symbols to scan. Defaults to the NIFTY 50 list.
        symbols: Vec<String>,

        /// Read symbols from a file (CSV with a Symbol column, or one per line).
        #[arg(long, conflicts_with = "symbols")]
        symbols_file: Option<PathBuf>,

        /// Scan a single timeframe instead of the higher/lower pair.
        #[arg(long)]
        timeframe: Option<Timeframe>,

        /// Higher (parent) timeframe.
        #[arg(long, default_value = "1mo")]
        higher: Timeframe,

        /// Lower (child) timeframe.
        #[arg(long, default_value = "1d")]
        lower: Timeframe,

        /// Worker threads. 1 runs sequentially.
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Also append the latest zone per symbol to this CSV file.
        #[arg(long)]
        append_latest: Option<PathBuf>,

        /// Run demand and supply back to back, saving each under
        /// <output-dir>/<direction>.
        #[arg(long, default_value_t = false)]
        both_directions: bool,

        #[command(flatten)]
        zone: ZoneArgs,

        #[command(flatten)]
        data: DataArgs,
    },
    /// List threshold presets, or print one as a TOML config.
    Presets {
        /// Preset to print as TOML.
        #[arg(long)]
        show: Option<ZonePreset>,
    },
}

#[derive(Args)]
struct ZoneArgs {
    /// Path to a TOML zone config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Named preset: balanced, strict, even, tight_base.
    #[arg(long)]
    preset: Option<ZonePreset>,

    /// Override direction: demand or supply.
    #[arg(long)]
    direction: Option<Direction>,

    /// Override the reward:risk multiple used for the target price.
    #[arg(long)]
    reward_risk: Option<f64>,

    /// Report entered-but-unresolved zones as Tested instead of Fresh.
    #[arg(long, default_value_t = false)]
    strict_entry: bool,

    /// Lower-timeframe candles that decide nested zone status: restricted or full.
    #[arg(long)]
    child_series: Option<ChildSeries>,
}

struct BatchOpts {
    mode: ScanMode,
    jobs: usize,
    output_dir: PathBuf,
    append_latest: Option<PathBuf>,
    both_directions: bool,
}

#[derive(Args)]
struct DataArgs {
    /// Directory of <SYMBOL>_<timeframe>.csv files.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Use a deterministic synthetic random walk instead of CSV files.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Synthetic start date (YYYY-MM-DD). Defaults to 5 years ago.
    #[arg(long, requires = "synthetic")]
    start: Option<NaiveDate>,

    /// Synthetic end date (YYYY-MM-DD). Defaults to today.
    #[arg(long, requires = "synthetic")]
    end: Option<NaiveDate>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            symbol,
            timeframe,
            json,
            zone,
            data,
        } => run_scan(&symbol, ScanMode::Single { timeframe }, json, &zone, &data),
        Commands::Correlate {
            symbol,
            higher,
            lower,
            json,
            zone,
            data,
        } => run_scan(&symbol, ScanMode::Nested { higher, lower }, json, &zone, &data),
        Commands::Batch {
            symbols,
            symbols_file,
            timeframe,
            higher,
            lower,
            jobs,
            output_dir,
            append_latest,
            both_directions,
            zone,
            data,
        } => {
            let mode = match timeframe {
                Some(timeframe) => ScanMode::Single { timeframe },
                None => ScanMode::Nested { higher, lower },
            };
            let symbols = resolve_symbols(symbols, symbols_file)?;
            let opts = BatchOpts {
                mode,
                jobs,
                output_dir,
                append_latest,
                both_directions,
            };
            run_batch(&symbols, &opts, &zone, &data)
        }
        Commands::Presets { show } => run_presets(show),
    }
}

/// Logs go to stderr so stdout carries only results.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(args: &ZoneArgs) -> Result<ZoneConfig> {
    if args.config.is_some() && args.preset.is_some() {
        bail!("--config and --preset are mutually exclusive");
    }

    let mut config = match (&args.config, args.preset) {
        (Some(path), _) => ZoneConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(preset)) => preset.to_config(),
        (None, None) => ZoneConfig::default(),
    };
    if let Some(direction) = args.direction {
        config = config.with_direction(direction);
    }
    if let Some(multiple) = args.reward_risk {
        config.reward_risk_multiple = multiple;
    }
    if args.strict_entry {
        config.strict_entry = true;
    }
    if let Some(series) = args.child_series {
        config.child_series = series;
    }
    config.validate()?;
    Ok(config)
}

fn build_source(args: &DataArgs) -> Result<Box<dyn CandleSource>> {
    if args.synthetic {
        let today = Local::now().date_naive();
        let end = args.end.unwrap_or(today);
        let start = match args.start {
            Some(start) => start,
            None => end
                .with_year(end.year() - 5)
                .context("cannot compute default start date")?,
        };
        if start > end {
            bail!("--start {start} is after --end {end}");
        }
        eprintln!("WARNING: using SYNTHETIC data ({start} to {end})");
        return Ok(Box::new(SyntheticSource::new(start, end)));
    }
    if !args.data_dir.is_dir() {
        bail!(
            "data directory {} does not exist (use --synthetic for synthetic data)",
            args.data_dir.display()
        );
    }
    Ok(Box::new(CsvDirSource::new(&args.data_dir)))
}

fn resolve_symbols(symbols: Vec<String>, symbols_file: Option<PathBuf>) -> Result<Vec<String>> {
    if let Some(path) = symbols_file {
        let loaded = load_symbols(&path)
            .with_context(|| format!("failed to read symbols from {}", path.display()))?;
        if loaded.is_empty() {
            bail!("no symbols in {}", path.display());
        }
        return Ok(loaded);
    }
    if symbols.is_empty() {
        return Ok(nifty50());
    }
    Ok(symbols)
}

fn run_scan(
    symbol: &str,
    mode: ScanMode,
    json: bool,
    zone: &ZoneArgs,
    data: &DataArgs,
) -> Result<()> {
    let config = build_config(zone)?;
    let source = build_source(data)?;
    let report = run_symbol(source.as_ref(), symbol, mode, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.zones)?);
    } else {
        print!("{}", export_zones_csv(&report.zones)?);
    }
    print_symbol_summary(&report, &config);
    Ok(())
}

/// First Ctrl-C skips pending symbols; a second one exits.
fn install_cancel_handler(cancel: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
        eprintln!("Cancelling: pending symbols will be skipped (Ctrl-C again to quit)");
    })
    .context("failed to install Ctrl-C handler")
}

fn run_batch(symbols: &[String], opts: &BatchOpts, zone: &ZoneArgs, data: &DataArgs) -> Result<()> {
    if opts.both_directions && zone.direction.is_some() {
        bail!("--both-directions and --direction are mutually exclusive");
    }
    let config = build_config(zone)?;
    let source = build_source(data)?;
    let runner = BatchRunner::new(config, opts.mode)?.jobs(opts.jobs);
    install_cancel_handler(runner.cancel_flag())?;

    let progress = |p: &BatchProgress| {
        let mark = if p.ok { "ok" } else { "FAILED" };
        eprintln!("[{}/{}] {} {mark}", p.completed, p.total, p.symbol);
    };

    if !opts.both_directions {
        let report = runner.run_with_progress(source.as_ref(), symbols, Some(&progress))?;
        return finish_batch(&report, &opts.output_dir, opts.append_latest.as_deref());
    }

    for direction in [Direction::Demand, Direction::Supply] {
        let runner = runner.for_direction(direction)?;
        eprintln!("--- {direction} ---");
        let report = runner.run_with_progress(source.as_ref(), symbols, Some(&progress))?;
        let append = opts
            .append_latest
            .as_deref()
            .map(|path| direction_path(path, direction));
        finish_batch(
            &report,
            &opts.output_dir.join(direction.to_string()),
            append.as_deref(),
        )?;
    }
    Ok(())
}

fn finish_batch(report: &BatchReport, output_dir: &Path, append_latest: Option<&Path>) -> Result<()> {
    print_batch_summary(report);

    let dir = save_batch(report, output_dir)?;
    println!("Artifacts saved to: {}", dir.display());

    if let Some(path) = append_latest {
        let latest = latest_zone_per_symbol(&report.reports);
        append_zones_csv(path, &latest)?;
        println!("Latest zones appended to: {}", path.display());
    }
    Ok(())
}

/// `latest.csv` becomes `latest_demand.csv` / `latest_supply.csv`.
fn direction_path(path: &Path, direction: Direction) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "latest".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{direction}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{direction}"),
    };
    path.with_file_name(name)
}

fn run_presets(show: Option<ZonePreset>) -> Result<()> {
    if let Some(preset) = show {
        print!("{}", preset.to_config().to_toml()?);
        return Ok(());
    }
    println!(
        "{:<12} {:>12} {:>12} {:>12} {:>8}",
        "preset", "leg_in", "base", "leg_out", "bases"
    );
    for preset in ZonePreset::all() {
        let c = preset.to_config();
        println!(
            "{:<12} {:>12} {:>12} {:>12} {:>8}",
            preset.name(),
            format!("[{},{}]", c.leg_in.min, c.leg_in.max),
            format!("[{},{}]", c.base.min, c.base.max),
            format!("[{},{}]", c.leg_out.min, c.leg_out.max),
            format!("{}..={}", c.base.min_count, c.base.max_count),
        );
    }
    Ok(())
}

fn print_symbol_summary(report: &SymbolReport, config: &ZoneConfig) {
    let s = &report.summary;
    eprintln!();
    eprintln!("=== {} ===", report.symbol);
    eprintln!("Direction:       {}", config.direction);
    eprintln!("Reward:risk:     1:{}", config.reward_risk_multiple);
    eprintln!("Zones:           {}", s.total());
    eprintln!("  Fresh:         {}", s.fresh);
    eprintln!("  Tested:        {}", s.tested);
    eprintln!("  TargetAchieved:{}", s.target_achieved);
}

fn print_batch_summary(report: &BatchReport) {
    let totals = report.totals();
    println!();
    println!("=== Batch Result ===");
    println!("Symbols:        {}", report.reports.len());
    println!("Zones:          {}", report.zone_count());
    println!("  Fresh:        {}", totals.fresh);
    println!("  Tested:       {}", totals.tested);
    println!("  Target:       {}", totals.target_achieved);
    println!("Elapsed:        {:.2}s", report.elapsed_secs);
    println!("Config hash:    {}", &report.config_hash[..12.min(report.config_hash.len())]);
    for f in &report.failures {
        println!("FAILED: {}: {}", f.symbol, f.reason);
    }
    if !report.cancelled.is_empty() {
        println!("Cancelled:      {}", report.cancelled.len());
    }
    println!();
}
