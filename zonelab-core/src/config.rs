//! Zone engine configuration.
//!
//! A `ZoneConfig` is an immutable value loaded from TOML (or built from a
//! named preset) and validated before any scan runs:
//!
//! ```toml
//! direction = "demand"
//! reward_risk_multiple = 2.0
//! child_series = "restricted"
//!
//! [leg_in]
//! min = 50.0
//! max = 100.0
//!
//! [base]
//! min = 0.0
//! max = 50.0
//! min_count = 1
//! max_count = 5
//!
//! [leg_out]
//! min = 50.0
//! max = 100.0
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::classify::{CandleRole, ClassificationBand};
use crate::domain::Direction;

/// Reward:risk multiple used when no value is configured.
pub const DEFAULT_REWARD_RISK_MULTIPLE: f64 = 2.0;

/// Configuration errors. Raised before scanning, never mid-scan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{role} band has min {min} above max {max}")]
    InvalidBand { role: CandleRole, min: f64, max: f64 },

    #[error("{role} band [{min}, {max}] must lie within [0, 100]")]
    BandOutOfRange { role: CandleRole, min: f64, max: f64 },

    #[error("minimum base count must be at least 1, got {0}")]
    InvalidBaseCount(usize),

    #[error("maximum base count {max} is below minimum base count {min}")]
    BaseCountOrder { min: usize, max: usize },

    #[error("reward:risk multiple must be finite and positive, got {0}")]
    InvalidRewardRisk(f64),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("config I/O error: {0}")]
    Io(String),

    #[error("unknown preset '{0}' (valid: balanced, strict, even, tight_base)")]
    UnknownPreset(String),

    #[error("unknown child series '{0}' (valid: restricted, full)")]
    UnknownChildSeries(String),
}

/// Which lower-timeframe candles decide the status of a nested zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildSeries {
    /// Only candles inside some parent window. Price action between
    /// windows is invisible to the walk.
    #[default]
    Restricted,
    /// Every lower-timeframe candle after the leg-out.
    Full,
}

impl ChildSeries {
    pub fn name(&self) -> &'static str {
        match self {
            ChildSeries::Restricted => "restricted",
            ChildSeries::Full => "full",
        }
    }
}

impl fmt::Display for ChildSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChildSeries {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restricted" => Ok(ChildSeries::Restricted),
            "full" => Ok(ChildSeries::Full),
            other => Err(ConfigError::UnknownChildSeries(other.to_string())),
        }
    }
}

/// Role bands plus the run-length bounds of the base window.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBands {
    pub leg_in: ClassificationBand,
    pub base: ClassificationBand,
    pub leg_out: ClassificationBand,
    pub min_base_count: usize,
    pub max_base_count: usize,
}

impl ScanBands {
    pub fn band(&self, role: CandleRole) -> &ClassificationBand {
        match role {
            CandleRole::LegIn => &self.leg_in,
            CandleRole::Base => &self.base,
            CandleRole::LegOut => &self.leg_out,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in CandleRole::ALL {
            let band = self.band(role);
            let (min, max) = (band.min, band.max);
            let bounds = 0.0..=100.0;
            if !bounds.contains(&min) || !bounds.contains(&max) {
                return Err(ConfigError::BandOutOfRange { role, min, max });
            }
            if min > max {
                return Err(ConfigError::InvalidBand { role, min, max });
            }
        }
        if self.min_base_count < 1 {
            return Err(ConfigError::InvalidBaseCount(self.min_base_count));
        }
        if self.max_base_count < self.min_base_count {
            return Err(ConfigError::BaseCountOrder {
                min: self.min_base_count,
                max: self.max_base_count,
            });
        }
        Ok(())
    }
}

impl Default for ScanBands {
    fn default() -> Self {
        ZonePreset::Balanced.to_config().scan_bands()
    }
}

/// Settings for the forward-looking lifecycle evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleConfig {
    /// Target distance from the zone edge, in multiples of zone height.
    pub reward_risk_multiple: f64,
    /// Report zones that were entered but never resolved as `Tested`
    /// instead of `Fresh`.
    pub strict_entry: bool,
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = self.reward_risk_multiple;
        if !m.is_finite() || m <= 0.0 {
            return Err(ConfigError::InvalidRewardRisk(m));
        }
        Ok(())
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            reward_risk_multiple: DEFAULT_REWARD_RISK_MULTIPLE,
            strict_entry: false,
        }
    }
}

/// Base band as written in TOML: body bounds plus run-length bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseBand {
    pub min: f64,
    pub max: f64,
    pub min_count: usize,
    pub max_count: usize,
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    #[serde(default = "default_direction")]
    pub direction: Direction,
    #[serde(default = "default_reward_risk_multiple")]
    pub reward_risk_multiple: f64,
    #[serde(default)]
    pub strict_entry: bool,
    #[serde(default)]
    pub child_series: ChildSeries,
    pub leg_in: ClassificationBand,
    pub base: BaseBand,
    pub leg_out: ClassificationBand,
}

fn default_direction() -> Direction {
    Direction::Demand
}

fn default_reward_risk_multiple() -> f64 {
    DEFAULT_REWARD_RISK_MULTIPLE
}

impl ZoneConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ZoneConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scan_bands().validate()?;
        self.lifecycle().validate()
    }

    pub fn scan_bands(&self) -> ScanBands {
        ScanBands {
            leg_in: self.leg_in,
            base: ClassificationBand::new(self.base.min, self.base.max),
            leg_out: self.leg_out,
            min_base_count: self.base.min_count,
            max_base_count: self.base.max_count,
        }
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            reward_risk_multiple: self.reward_risk_multiple,
            strict_entry: self.strict_entry,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// BLAKE3 hash of the canonical JSON form. Identical configs hash identically.
    pub fn config_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZonePreset::Balanced.to_config()
    }
}

/// Named threshold sets, one per scanner variant in common use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZonePreset {
    /// 50/0-50/50 bands, 1..=5 base candles.
    Balanced,
    /// 60/0-45/60 bands, 1..=5 base candles.
    Strict,
    /// Symmetric 50% split, 1..=5 base candles.
    Even,
    /// 55/0-45/55 bands, 1..=3 base candles.
    TightBase,
}

impl ZonePreset {
    pub fn all() -> [ZonePreset; 4] {
        [
            ZonePreset::Balanced,
            ZonePreset::Strict,
            ZonePreset::Even,
            ZonePreset::TightBase,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ZonePreset::Balanced => "balanced",
            ZonePreset::Strict => "strict",
            ZonePreset::Even => "even",
            ZonePreset::TightBase => "tight_base",
        }
    }

    pub fn to_config(&self) -> ZoneConfig {
        let (leg, base_max, max_count) = match self {
            ZonePreset::Balanced => (50.0, 50.0, 5),
            ZonePreset::Strict => (60.0, 45.0, 5),
            ZonePreset::Even => (50.0, 50.0, 5),
            ZonePreset::TightBase => (55.0, 45.0, 3),
        };
        ZoneConfig {
            direction: Direction::Demand,
            reward_risk_multiple: DEFAULT_REWARD_RISK_MULTIPLE,
            strict_entry: false,
            child_series: ChildSeries::Restricted,
            leg_in: ClassificationBand::new(leg, 100.0),
            base: BaseBand {
                min: 0.0,
                max: base_max,
                min_count: 1,
                max_count,
            },
            leg_out: ClassificationBand::new(leg, 100.0),
        }
    }
}

impl fmt::Display for ZonePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ZonePreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ZonePreset::all()
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}
