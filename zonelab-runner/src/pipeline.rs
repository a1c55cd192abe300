//! Per-symbol pipeline: classification → scan → lifecycle → correlation.
//!
//! Turns candle series into `ZoneRecord`s, the flat output schema consumed by
//! the CSV/JSON writers. Each symbol is processed end-to-end with no shared
//! state, so the batch runner can fan symbols out across threads.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use zonelab_core::domain::validate_sequence;
use zonelab_core::{
    correlate_with, evaluate_children, evaluate_zones, Candle, CandleError, ConfigError, Zone,
    ZoneConfig, ZoneError, ZoneScanner, ZoneStatus,
};

use crate::source::{CandleSource, SourceError, Timeframe};

/// Errors from running the pipeline on one symbol.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("candle error: {0}")]
    Candle(#[from] CandleError),

    #[error("zone error: {0}")]
    Zone(#[from] ZoneError),
}

/// One output row. Field names are a stable external schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRecord {
    pub symbol: String,
    pub leg_in_time: NaiveDateTime,
    pub leg_out_time: NaiveDateTime,
    pub zone_high: f64,
    pub zone_low: f64,
    pub status: ZoneStatus,
    pub parent_leg_in_time: Option<NaiveDateTime>,
    pub parent_leg_out_time: Option<NaiveDateTime>,
    pub parent_zone_high: Option<f64>,
    pub parent_zone_low: Option<f64>,
}

impl ZoneRecord {
    /// Record for a zone with an assigned status, found on `candles`.
    fn from_zone(symbol: &str, zone: &Zone, candles: &[Candle]) -> Option<Self> {
        Some(Self {
            symbol: symbol.to_string(),
            leg_in_time: candles.get(zone.leg_in_index())?.timestamp,
            leg_out_time: candles.get(zone.leg_out_index())?.timestamp,
            zone_high: zone.zone_high(),
            zone_low: zone.zone_low(),
            status: zone.status()?,
            parent_leg_in_time: None,
            parent_leg_out_time: None,
            parent_zone_high: None,
            parent_zone_low: None,
        })
    }

    fn with_parent(mut self, parent: &Zone, higher: &[Candle]) -> Self {
        self.parent_leg_in_time = higher.get(parent.leg_in_index()).map(|c| c.timestamp);
        self.parent_leg_out_time = higher.get(parent.leg_out_index()).map(|c| c.timestamp);
        self.parent_zone_high = Some(parent.zone_high());
        self.parent_zone_low = Some(parent.zone_low());
        self
    }

    pub fn has_parent(&self) -> bool {
        self.parent_leg_in_time.is_some()
    }
}

/// Per-symbol count of zones by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub fresh: usize,
    pub tested: usize,
    pub target_achieved: usize,
}

impl StatusSummary {
    pub fn from_records(records: &[ZoneRecord]) -> Self {
        let mut s = Self::default();
        for r in records {
            s.record(r.status);
        }
        s
    }

    pub fn record(&mut self, status: ZoneStatus) {
        match status {
            ZoneStatus::Fresh => self.fresh += 1,
            ZoneStatus::Tested => self.tested += 1,
            ZoneStatus::TargetAchieved => self.target_achieved += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.fresh + self.tested + self.target_achieved
    }

    pub fn merge(&mut self, other: &StatusSummary) {
        self.fresh += other.fresh;
        self.tested += other.tested;
        self.target_achieved += other.target_achieved;
    }
}

/// All zones found for one symbol, in ascending leg-in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub zones: Vec<ZoneRecord>,
    pub summary: StatusSummary,
}

impl SymbolReport {
    pub fn new(symbol: impl Into<String>, zones: Vec<ZoneRecord>) -> Self {
        let summary = StatusSummary::from_records(&zones);
        Self {
            symbol: symbol.into(),
            zones,
            summary,
        }
    }

    /// Report for a symbol with no usable data.
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::new(symbol, Vec::new())
    }
}

/// What to run for each symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScanMode {
    /// Scan and evaluate one timeframe.
    Single { timeframe: Timeframe },
    /// Scan `lower` inside the windows of zones found on `higher`.
    Nested { higher: Timeframe, lower: Timeframe },
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Nested {
            higher: Timeframe::Month1,
            lower: Timeframe::Day1,
        }
    }
}

/// Scan one series and evaluate every zone from the candle after its leg-out.
pub fn analyze_symbol(
    symbol: &str,
    candles: &[Candle],
    config: &ZoneConfig,
) -> Result<SymbolReport, PipelineError> {
    config.validate()?;
    validate_sequence(candles)?;
    let scanner = ZoneScanner::new(config.scan_bands(), config.direction)?;

    let mut zones = scanner.scan(candles);
    evaluate_zones(&mut zones, candles, &config.lifecycle())?;

    let records: Vec<ZoneRecord> = zones
        .iter()
        .filter_map(|z| ZoneRecord::from_zone(symbol, z, candles))
        .collect();
    let report = SymbolReport::new(symbol, records);
    info!(
        symbol,
        direction = %scanner.direction(),
        candles = candles.len(),
        zones = report.zones.len(),
        fresh = report.summary.fresh,
        tested = report.summary.tested,
        target_achieved = report.summary.target_achieved,
        "analyzed symbol"
    );
    Ok(report)
}

/// Two-timeframe run. Child zones are evaluated from the candle after their
/// leg-out on the series chosen by `config.child_series`: by default only
/// lower candles inside parent windows count.
pub fn correlate_symbol(
    symbol: &str,
    higher: &[Candle],
    lower: &[Candle],
    config: &ZoneConfig,
) -> Result<SymbolReport, PipelineError> {
    config.validate()?;
    validate_sequence(higher)?;
    validate_sequence(lower)?;
    let scanner = ZoneScanner::new(config.scan_bands(), config.direction)?;

    let mut correlation = correlate_with(&scanner, higher, lower);
    evaluate_children(
        &mut correlation,
        lower,
        &config.lifecycle(),
        config.child_series,
    )?;

    // child order follows window order; the output wants ascending leg-in
    correlation.children.sort_by_key(|c| c.zone.leg_in_index());

    let records: Vec<ZoneRecord> = correlation
        .children
        .iter()
        .filter_map(|child| {
            let record = ZoneRecord::from_zone(symbol, &child.zone, lower)?;
            Some(match correlation.parent_of(child) {
                Some(parent) => record.with_parent(parent, higher),
                None => record,
            })
        })
        .collect();

    let report = SymbolReport::new(symbol, records);
    info!(
        symbol,
        direction = %scanner.direction(),
        parents = correlation.parents.len(),
        zones = report.zones.len(),
        fresh = report.summary.fresh,
        tested = report.summary.tested,
        target_achieved = report.summary.target_achieved,
        "correlated symbol"
    );
    Ok(report)
}

/// Fetch from `source` and run `mode` for one symbol.
///
/// A symbol the source has nothing for is insufficient data: it yields an
/// empty report and a warning instead of an error.
pub fn run_symbol(
    source: &dyn CandleSource,
    symbol: &str,
    mode: ScanMode,
    config: &ZoneConfig,
) -> Result<SymbolReport, PipelineError> {
    match mode {
        ScanMode::Single { timeframe } => {
            let Some(candles) = fetch_or_empty(source, symbol, timeframe)? else {
                return Ok(SymbolReport::empty(symbol));
            };
            analyze_symbol(symbol, &candles, config)
        }
        ScanMode::Nested { higher, lower } => {
            let Some(higher_candles) = fetch_or_empty(source, symbol, higher)? else {
                return Ok(SymbolReport::empty(symbol));
            };
            let Some(lower_candles) = fetch_or_empty(source, symbol, lower)? else {
                return Ok(SymbolReport::empty(symbol));
            };
            correlate_symbol(symbol, &higher_candles, &lower_candles, config)
        }
    }
}

fn fetch_or_empty(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Option<Vec<Candle>>, SourceError> {
    match source.fetch(symbol, timeframe) {
        Ok(candles) if candles.is_empty() => {
            warn!(symbol, %timeframe, source = source.name(), "no candles; skipping");
            Ok(None)
        }
        Ok(candles) => Ok(Some(candles)),
        Err(e) if e.is_not_found() => {
            warn!(symbol, %timeframe, source = source.name(), "symbol not found; skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Most recent zone (by leg-out time) for each symbol that has any.
pub fn latest_zone_per_symbol(reports: &[SymbolReport]) -> Vec<ZoneRecord> {
    reports
        .iter()
        .filter_map(|r| r.zones.iter().max_by_key(|z| z.leg_out_time).cloned())
        .collect()
}
