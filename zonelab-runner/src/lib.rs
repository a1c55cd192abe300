//! ZoneLab Runner: candle sources, per-symbol pipeline, batch scans, export.
//!
//! This crate builds on `zonelab-core` to provide:
//! - Candle sources: CSV directory, in-memory map, seeded synthetic walk
//! - Symbol lists, with NIFTY 50 as the built-in universe
//! - Single- and two-timeframe per-symbol pipeline producing `ZoneRecord`s
//! - Batch runner on a bounded worker pool with isolated per-symbol failures
//! - CSV/JSON export and artifact bundles

pub mod batch;
pub mod export;
pub mod pipeline;
pub mod source;

pub use batch::{BatchError, BatchProgress, BatchReport, BatchRunner, SymbolFailure};
pub use export::{
    append_zones_csv, export_json, export_summary_csv, export_zones_csv, save_batch,
};
pub use pipeline::{
    analyze_symbol, correlate_symbol, latest_zone_per_symbol, run_symbol, PipelineError,
    ScanMode, StatusSummary, SymbolReport, ZoneRecord,
};
pub use source::{
    load_symbols, nifty50, CandleSource, CsvDirSource, MemorySource, SourceError,
    SyntheticSource, Timeframe, NIFTY50,
};
