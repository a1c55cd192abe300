//! Export: zone tables as CSV, batch results as JSON.
//!
//! - `zones.csv`: one row per zone in the stable record schema
//! - `summary.csv`: per-symbol status counts
//! - `manifest.json`: config hash, mode, failures and counts for the batch
//!
//! CSV timestamps print as `YYYY-MM-DD` for midnight stamps and
//! `YYYY-MM-DD HH:MM:SS` otherwise; missing parent fields are empty cells.
//!
//! `parentZoneHigh` / `parentZoneLow` are the parent zone's base-candle
//! bounds, the same definition as the child's `zoneHigh` / `zoneLow`. They
//! are not the parent leg-in high or leg-out low, so files written by older
//! leg-based scanners will not match these columns.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::batch::{BatchReport, SymbolFailure};
use crate::pipeline::{ScanMode, SymbolReport, ZoneRecord};

pub const ZONE_COLUMNS: [&str; 10] = [
    "symbol",
    "legInTime",
    "legOutTime",
    "zoneHigh",
    "zoneLow",
    "status",
    "parentLegInTime",
    "parentLegOutTime",
    "parentZoneHigh",
    "parentZoneLow",
];

fn format_time(ts: NaiveDateTime) -> String {
    if ts.time() == NaiveTime::MIN {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn format_price(p: f64) -> String {
    format!("{p:.4}")
}

fn zone_row(r: &ZoneRecord) -> [String; 10] {
    [
        r.symbol.clone(),
        format_time(r.leg_in_time),
        format_time(r.leg_out_time),
        format_price(r.zone_high),
        format_price(r.zone_low),
        r.status.to_string(),
        r.parent_leg_in_time.map(format_time).unwrap_or_default(),
        r.parent_leg_out_time.map(format_time).unwrap_or_default(),
        r.parent_zone_high.map(format_price).unwrap_or_default(),
        r.parent_zone_low.map(format_price).unwrap_or_default(),
    ]
}

fn write_zone_rows<W: std::io::Write>(
    wtr: &mut csv::Writer<W>,
    records: &[ZoneRecord],
) -> Result<()> {
    for r in records {
        wtr.write_record(zone_row(r))?;
    }
    Ok(())
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Zone records as CSV, header included.
pub fn export_zones_csv(records: &[ZoneRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(ZONE_COLUMNS)?;
    write_zone_rows(&mut wtr, records)?;
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Append zone records to `path`, writing the header only when the file is
/// new or empty.
pub fn append_zones_csv(path: &Path, records: &[ZoneRecord]) -> Result<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut wtr = csv::Writer::from_writer(file);
    if is_new {
        wtr.write_record(ZONE_COLUMNS)?;
    }
    write_zone_rows(&mut wtr, records)?;
    wtr.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

/// Per-symbol status counts as CSV.
///
/// Columns: symbol, fresh, tested, target_achieved, total
pub fn export_summary_csv(reports: &[SymbolReport]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "fresh", "tested", "target_achieved", "total"])?;
    for r in reports {
        let s = &r.summary;
        wtr.write_record([
            r.symbol.clone(),
            s.fresh.to_string(),
            s.tested.to_string(),
            s.target_achieved.to_string(),
            s.total().to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

/// Pretty JSON of the full batch report, zones included.
pub fn export_json(report: &BatchReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BatchReport to JSON")
}

/// Batch metadata without the zone rows.
#[derive(Debug, Serialize)]
struct Manifest<'a> {
    config_hash: &'a str,
    mode: ScanMode,
    generated_at: String,
    elapsed_secs: f64,
    symbols: usize,
    zones: usize,
    fresh: usize,
    tested: usize,
    target_achieved: usize,
    failures: &'a [SymbolFailure],
    cancelled: &'a [String],
}

fn manifest_json(report: &BatchReport) -> Result<String> {
    let totals = report.totals();
    let manifest = Manifest {
        config_hash: &report.config_hash,
        mode: report.mode,
        generated_at: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        elapsed_secs: report.elapsed_secs,
        symbols: report.reports.len(),
        zones: report.zone_count(),
        fresh: totals.fresh,
        tested: totals.tested,
        target_achieved: totals.target_achieved,
        failures: &report.failures,
        cancelled: &report.cancelled,
    };
    serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `zones.csv`, `summary.csv` and `manifest.json` into `output_dir`.
///
/// Returns the directory written to.
pub fn save_batch(report: &BatchReport, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let zones: Vec<ZoneRecord> = report
        .reports
        .iter()
        .flat_map(|r| r.zones.iter().cloned())
        .collect();
    std::fs::write(output_dir.join("zones.csv"), export_zones_csv(&zones)?)
        .context("failed to write zones.csv")?;
    std::fs::write(
        output_dir.join("summary.csv"),
        export_summary_csv(&report.reports)?,
    )
    .context("failed to write summary.csv")?;
    std::fs::write(output_dir.join("manifest.json"), manifest_json(report)?)
        .context("failed to write manifest.json")?;

    Ok(output_dir.to_path_buf())
}
