//! Candle role classification by body percentage.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ScanBands;
use crate::domain::Candle;

/// Inclusive body-percentage bounds qualifying a candle for one role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationBand {
    pub min: f64,
    pub max: f64,
}

impl ClassificationBand {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `min <= pct <= max`
    pub fn contains(&self, pct: f64) -> bool {
        self.min <= pct && pct <= self.max
    }
}

/// The three roles a candle can play in a zone pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleRole {
    LegIn,
    Base,
    LegOut,
}

impl CandleRole {
    pub const ALL: [CandleRole; 3] = [CandleRole::LegIn, CandleRole::Base, CandleRole::LegOut];
}

impl fmt::Display for CandleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandleRole::LegIn => write!(f, "leg_in"),
            CandleRole::Base => write!(f, "base"),
            CandleRole::LegOut => write!(f, "leg_out"),
        }
    }
}

/// Whether the candle's body percentage falls inside `band`.
pub fn classify(candle: &Candle, band: &ClassificationBand) -> bool {
    band.contains(candle.body_percentage())
}

/// Whether the candle qualifies for `role` under `bands`.
pub fn qualifies(candle: &Candle, role: CandleRole, bands: &ScanBands) -> bool {
    classify(candle, bands.band(role))
}
