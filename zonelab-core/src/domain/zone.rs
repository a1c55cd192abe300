//! Zone: a validated leg-in / base / leg-out pattern and its price band.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::candle::Candle;

/// Which side of the market a zone represents.
///
/// Demand zones require a bullish leg-out that closes above the leg-in high
/// and every base high. Supply zones are the mirror image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Demand,
    Supply,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Demand => write!(f, "demand"),
            Direction::Supply => write!(f, "supply"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "demand" => Ok(Direction::Demand),
            "supply" => Ok(Direction::Supply),
            other => Err(format!("unknown direction '{other}' (expected demand or supply)")),
        }
    }
}

/// Terminal lifecycle status of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneStatus {
    /// Never revisited (or revisited without resolution, see `LifecycleConfig::strict_entry`).
    Fresh,
    /// Revisited and invalidated before the reward target.
    Tested,
    /// Revisited and the reward target was reached.
    TargetAchieved,
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneStatus::Fresh => write!(f, "Fresh"),
            ZoneStatus::Tested => write!(f, "Tested"),
            ZoneStatus::TargetAchieved => write!(f, "TargetAchieved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    #[error("zone {leg_in_index}..={leg_out_index} already has status {existing}")]
    StatusAlreadyAssigned {
        leg_in_index: usize,
        leg_out_index: usize,
        existing: ZoneStatus,
    },
}

/// A supply or demand zone found by the scanner.
///
/// The band `[zone_low, zone_high]` spans the base candles only; leg-in and
/// leg-out extremes are the move, not the resting area. Indices refer to the
/// candle series the zone was scanned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    leg_in_index: usize,
    leg_out_index: usize,
    base_candles: Vec<Candle>,
    direction: Direction,
    zone_high: f64,
    zone_low: f64,
    status: Option<ZoneStatus>,
}

impl Zone {
    /// Build a zone from a validated pattern. Returns `None` for an empty base.
    pub fn from_pattern(
        leg_in_index: usize,
        leg_out_index: usize,
        base_candles: Vec<Candle>,
        direction: Direction,
    ) -> Option<Self> {
        if base_candles.is_empty() {
            return None;
        }
        let zone_high = base_candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let zone_low = base_candles
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min);

        Some(Self {
            leg_in_index,
            leg_out_index,
            base_candles,
            direction,
            zone_high,
            zone_low,
            status: None,
        })
    }

    pub fn leg_in_index(&self) -> usize {
        self.leg_in_index
    }

    pub fn leg_out_index(&self) -> usize {
        self.leg_out_index
    }

    pub fn base_candles(&self) -> &[Candle] {
        &self.base_candles
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn zone_high(&self) -> f64 {
        self.zone_high
    }

    pub fn zone_low(&self) -> f64 {
        self.zone_low
    }

    /// `zone_high - zone_low`
    pub fn risk(&self) -> f64 {
        self.zone_high - self.zone_low
    }

    pub fn status(&self) -> Option<ZoneStatus> {
        self.status
    }

    /// Record the lifecycle status. A status is written once and never replaced.
    pub fn assign_status(&mut self, status: ZoneStatus) -> Result<(), ZoneError> {
        if let Some(existing) = self.status {
            return Err(ZoneError::StatusAlreadyAssigned {
                leg_in_index: self.leg_in_index,
                leg_out_index: self.leg_out_index,
                existing,
            });
        }
        self.status = Some(status);
        Ok(())
    }

    /// Shift both indices by `offset` (window-local to series-global).
    pub(crate) fn shifted(mut self, offset: usize) -> Self {
        self.leg_in_index += offset;
        self.leg_out_index += offset;
        self
    }
}

/// Weak link from a lower-timeframe zone to the enclosing higher-timeframe zone.
///
/// Holds the parent's position in the higher-timeframe zone list; the link
/// owns nothing and is only meaningful next to that list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedZoneLink {
    pub parent_index: usize,
}
