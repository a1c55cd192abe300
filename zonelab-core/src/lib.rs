//! ZoneLab Core: candle roles, zone scanner, lifecycle evaluator, timeframe correlator.
//!
//! This crate contains the zone detection engine:
//! - Domain types (candles, zones, directions, statuses)
//! - Body-percentage role classification (leg-in / base / leg-out)
//! - Single-pass greedy pattern scanner
//! - Forward-looking lifecycle evaluation against a reward:risk target
//! - Higher/lower timeframe nesting of zones
//! - Immutable, validated configuration with named presets
//!
//! Everything here is synchronous and pure over its inputs.

pub mod classify;
pub mod config;
pub mod correlate;
pub mod domain;
pub mod lifecycle;
pub mod scanner;

pub use classify::{classify, CandleRole, ClassificationBand};
pub use config::{ChildSeries, ConfigError, LifecycleConfig, ScanBands, ZoneConfig, ZonePreset};
pub use correlate::{
    correlate, correlate_with, evaluate_children, restricted_indices, restricted_series,
    CorrelatedZone, Correlation, TimeWindow,
};
pub use domain::{Candle, CandleError, Direction, NestedZoneLink, Zone, ZoneError, ZoneStatus};
pub use lifecycle::{assess, evaluate, evaluate_zones, target_price, Assessment};
pub use scanner::{scan, ZoneScanner};
