//! Candle sources: where per-symbol series come from.
//!
//! The `CandleSource` trait abstracts over CSV directories, in-memory maps and
//! the synthetic random walk so the pipeline and batch runner never care which
//! one they were handed. Sources return candles already validated: finite
//! prices, `high >= low`, strictly increasing timestamps.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use zonelab_core::domain::validate_sequence;
use zonelab_core::{Candle, CandleError};

/// Errors from candle sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no {timeframe} data for symbol '{symbol}'")]
    SymbolNotFound { symbol: String, timeframe: Timeframe },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: row {row}: {reason}")]
    InvalidRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("invalid candle data: {0}")]
    Candle(#[from] CandleError),
}

impl SourceError {
    /// True when the source simply has nothing for this symbol.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::SymbolNotFound { .. })
    }
}

/// Candle period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1wk")]
    Week1,
    #[serde(rename = "1mo")]
    Month1,
}

impl Timeframe {
    pub fn all() -> [Timeframe; 5] {
        [
            Timeframe::Minute15,
            Timeframe::Hour1,
            Timeframe::Day1,
            Timeframe::Week1,
            Timeframe::Month1,
        ]
    }

    /// Canonical label, also used in CSV file names.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Minute15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1wk",
            Timeframe::Month1 => "1mo",
        }
    }

    fn intraday_step_minutes(&self) -> Option<i64> {
        match self {
            Timeframe::Minute15 => Some(15),
            Timeframe::Hour1 => Some(60),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "15m" => Ok(Timeframe::Minute15),
            "1h" | "60m" => Ok(Timeframe::Hour1),
            "1d" | "daily" => Ok(Timeframe::Day1),
            "1wk" | "1w" | "weekly" => Ok(Timeframe::Week1),
            "1mo" | "monthly" => Ok(Timeframe::Month1),
            other => Err(format!(
                "unknown timeframe '{other}' (valid: 15m, 1h, 1d, 1wk, 1mo)"
            )),
        }
    }
}

/// Anything that can hand out a candle series for a symbol.
pub trait CandleSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the full series for `symbol` at `timeframe`, oldest first.
    fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>, SourceError>;
}

// ─── CSV directory ──────────────────────────────────────────────────

/// Reads `<dir>/<SYMBOL>_<timeframe>.csv`.
///
/// Expected header: `timestamp,open,high,low,close[,volume]`. The common
/// `Date`/`Datetime`, `Open`, `High`, `Low`, `Close` spellings are accepted
/// too; extra columns are ignored.
#[derive(Debug, Clone)]
pub struct CsvDirSource {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date", alias = "Datetime", alias = "date", alias = "Timestamp")]
    timestamp: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
}

impl CsvDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File the source reads for `symbol` at `timeframe`.
    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{symbol}_{}.csv", timeframe.label()))
    }
}

impl CandleSource for CsvDirSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>, SourceError> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return Err(SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
                timeframe,
            });
        }
        let candles = read_candles_csv(&path)?;
        debug!(symbol, %timeframe, candles = candles.len(), path = %path.display(), "loaded csv");
        Ok(candles)
    }
}

/// Parse and validate a candle CSV file.
pub fn read_candles_csv(path: &Path) -> Result<Vec<Candle>, SourceError> {
    let file = std::fs::File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut candles = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let row_no = i + 2;
        let row = row.map_err(|source| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| SourceError::InvalidRow {
            path: path.to_path_buf(),
            row: row_no,
            reason: format!("unrecognized timestamp '{}'", row.timestamp),
        })?;
        candles.push(Candle::new(timestamp, row.open, row.high, row.low, row.close)?);
    }

    validate_sequence(&candles)?;
    Ok(candles)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, ISO `T`-separated forms and
/// RFC 3339 / offset-suffixed stamps (kept in exchange-local wall time).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_time(NaiveTime::MIN));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z")
        .ok()
        .map(|dt| dt.naive_local())
}

// ─── In-memory ──────────────────────────────────────────────────────

/// Map-backed source for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: HashMap<(String, Timeframe), Vec<Candle>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a series, validating its timestamp order.
    pub fn insert(
        &mut self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<(), SourceError> {
        validate_sequence(&candles)?;
        self.series.insert((symbol.into(), timeframe), candles);
        Ok(())
    }

    pub fn with(
        mut self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<Self, SourceError> {
        self.insert(symbol, timeframe, candles)?;
        Ok(self)
    }
}

impl CandleSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>, SourceError> {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .ok_or_else(|| SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
                timeframe,
            })
    }
}

// ─── Synthetic ──────────────────────────────────────────────────────

/// Deterministic random walk, seeded per symbol.
///
/// Daily candles skip weekends. Weekly and monthly candles aggregate the same
/// daily walk, so timeframes of one symbol describe one price path. Intraday
/// candles run 09:15 to 15:30 on weekdays. Clearly fake: use for demos and
/// benchmarks only.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SyntheticSource {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    fn daily(&self, symbol: &str) -> Result<Vec<Candle>, CandleError> {
        let mut walk = RandomWalk::seeded(symbol.as_bytes());
        let mut candles = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            if !is_weekend(current) {
                let (o, h, l, c) = walk.step(0.03);
                candles.push(Candle::on_date(current, o, h, l, c)?);
            }
            current += chrono::Duration::days(1);
        }
        Ok(candles)
    }

    fn intraday(&self, symbol: &str, step_minutes: i64) -> Result<Vec<Candle>, CandleError> {
        let seed = format!("{symbol}:{step_minutes}m");
        let mut walk = RandomWalk::seeded(seed.as_bytes());
        let open = NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN);
        let close = NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN);

        let mut candles = Vec::new();
        let mut day = self.start;
        while day <= self.end {
            if !is_weekend(day) {
                let mut ts = day.and_time(open);
                let session_end = day.and_time(close);
                while ts < session_end {
                    let (o, h, l, c) = walk.step(0.006);
                    candles.push(Candle::new(ts, o, h, l, c)?);
                    ts += chrono::Duration::minutes(step_minutes);
                }
            }
            day += chrono::Duration::days(1);
        }
        Ok(candles)
    }
}

impl CandleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>, SourceError> {
        let candles = match timeframe.intraday_step_minutes() {
            Some(step) => self.intraday(symbol, step)?,
            None => {
                let daily = self.daily(symbol)?;
                match timeframe {
                    Timeframe::Week1 => aggregate(&daily, |d| {
                        let w = d.iso_week();
                        (w.year(), w.week())
                    })?,
                    Timeframe::Month1 => aggregate(&daily, |d| (d.year(), d.month()))?,
                    _ => daily,
                }
            }
        };
        Ok(candles)
    }
}

struct RandomWalk {
    rng: rand::rngs::StdRng,
    price: f64,
}

impl RandomWalk {
    fn seeded(seed: &[u8]) -> Self {
        use rand::SeedableRng;
        let seed: [u8; 32] = *blake3::hash(seed).as_bytes();
        Self {
            rng: rand::rngs::StdRng::from_seed(seed),
            price: 100.0,
        }
    }

    fn step(&mut self, max_move: f64) -> (f64, f64, f64, f64) {
        use rand::Rng;
        let ret: f64 = self.rng.gen_range(-max_move..max_move);
        let open = self.price;
        let close = open * (1.0 + ret);
        let wick = max_move / 3.0;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..wick));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..wick));
        self.price = close;
        (open, high, low, close)
    }
}

fn is_weekend(d: NaiveDate) -> bool {
    matches!(d.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

/// Roll consecutive candles sharing a period key into one candle stamped at
/// the first member's timestamp.
fn aggregate<K, F>(candles: &[Candle], key: F) -> Result<Vec<Candle>, CandleError>
where
    K: PartialEq,
    F: Fn(NaiveDate) -> K,
{
    let mut out = Vec::new();
    let mut start = 0;
    while start < candles.len() {
        let k = key(candles[start].timestamp.date());
        let len = candles[start..]
            .iter()
            .take_while(|c| key(c.timestamp.date()) == k)
            .count();
        let group = &candles[start..start + len];
        let high = group.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let low = group.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        out.push(Candle::new(
            group[0].timestamp,
            group[0].open,
            high,
            low,
            group[len - 1].close,
        )?);
        start += len;
    }
    Ok(out)
}

// ─── Symbol lists ───────────────────────────────────────────────────

/// NIFTY 50 constituents (Yahoo Finance tickers), the default universe.
pub const NIFTY50: &[&str] = &[
    "RELIANCE.NS", "TCS.NS", "HDFCBANK.NS", "INFY.NS", "HINDUNILVR.NS", "ICICIBANK.NS",
    "KOTAKBANK.NS", "HDFC.NS", "BHARTIARTL.NS", "ITC.NS", "LT.NS", "SBIN.NS",
    "ASIANPAINT.NS", "AXISBANK.NS", "BAJFINANCE.NS", "HCLTECH.NS", "MARUTI.NS",
    "HDFCLIFE.NS", "SUNPHARMA.NS", "WIPRO.NS", "ULTRACEMCO.NS", "ONGC.NS", "POWERGRID.NS",
    "TITAN.NS", "NTPC.NS", "GRASIM.NS", "INDUSINDBK.NS", "NESTLEIND.NS", "JSWSTEEL.NS",
    "BAJAJFINSV.NS", "TATASTEEL.NS", "BPCL.NS", "M&M.NS", "DRREDDY.NS", "DIVISLAB.NS",
    "HEROMOTOCO.NS", "ADANIPORTS.NS", "CIPLA.NS", "COALINDIA.NS", "SHREECEM.NS",
    "TECHM.NS", "BRITANNIA.NS", "EICHERMOT.NS", "HINDALCO.NS", "TATACONSUM.NS",
    "APOLLOHOSP.NS", "ADANIENT.NS", "UPL.NS", "SBILIFE.NS", "BAJAJ-AUTO.NS",
];

/// The built-in universe as owned strings.
pub fn nifty50() -> Vec<String> {
    NIFTY50.iter().map(|s| s.to_string()).collect()
}

/// Load a symbol list.
///
/// A file whose first line mentions a `Symbol` column is read as CSV and that
/// column is used. Anything else is one symbol per line; blank lines and `#`
/// comments are skipped. Duplicates are dropped, first occurrence wins.
pub fn load_symbols(path: &Path) -> Result<Vec<String>, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let first = content.lines().next().unwrap_or_default();
    let has_header = first
        .split(',')
        .any(|h| h.trim().eq_ignore_ascii_case("symbol"));

    let raw: Vec<String> = if has_header {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = reader.headers().map_err(|source| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let col = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("symbol"))
            .unwrap_or(0);
        let mut symbols = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| SourceError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            if let Some(s) = record.get(col) {
                symbols.push(s.to_string());
            }
        }
        symbols
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.starts_with('#'))
            .map(String::from)
            .collect()
    };

    let mut seen = std::collections::HashSet::new();
    Ok(raw
        .into_iter()
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect())
}
