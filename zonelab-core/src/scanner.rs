//! Zone pattern scanner.
//!
//! One left-to-right pass over a candle series. At each leg-in candidate the
//! scanner collects a run of base candles, then checks the candle right after
//! the run for a leg-out breakout in the configured direction. Whatever the
//! outcome, the pointer jumps to that candle (never past it), so a breakout
//! can seed the next pattern. The pointer never moves backwards.

use tracing::{debug, trace};

use crate::classify::{qualifies, CandleRole};
use crate::config::{ConfigError, ScanBands};
use crate::domain::{Candle, Direction, Zone};

/// Fewer candles than this cannot form a leg-in / base / leg-out triple.
pub const MIN_PATTERN_CANDLES: usize = 3;

/// A validated scanner: bands are checked once at construction.
#[derive(Debug, Clone)]
pub struct ZoneScanner {
    bands: ScanBands,
    direction: Direction,
}

impl ZoneScanner {
    pub fn new(bands: ScanBands, direction: Direction) -> Result<Self, ConfigError> {
        bands.validate()?;
        Ok(Self { bands, direction })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Scan a contiguous, time-ordered series. Zones come back in ascending
    /// `leg_in_index` order; consecutive zones may share the breakout candle.
    pub fn scan(&self, candles: &[Candle]) -> Vec<Zone> {
        let n = candles.len();
        let mut zones = Vec::new();
        if n < MIN_PATTERN_CANDLES {
            return zones;
        }

        let mut i = 0;
        while i + 2 < n {
            if !qualifies(&candles[i], CandleRole::LegIn, &self.bands) {
                i += 1;
                continue;
            }

            let run_start = i + 1;
            let run_len = candles[run_start..]
                .iter()
                .take(self.bands.max_base_count)
                .take_while(|c| qualifies(c, CandleRole::Base, &self.bands))
                .count();
            let j = run_start + run_len;

            if run_len < self.bands.min_base_count {
                trace!(leg_in = i, run_len, "base run too short");
            } else if j >= n {
                trace!(leg_in = i, "series ends before leg-out");
            } else if let Some(zone) = self.confirm(candles, i, run_start, j) {
                debug!(
                    leg_in = zone.leg_in_index(),
                    leg_out = zone.leg_out_index(),
                    zone_high = zone.zone_high(),
                    zone_low = zone.zone_low(),
                    direction = %self.direction,
                    "zone detected"
                );
                zones.push(zone);
            }

            i = j;
        }

        zones
    }

    /// Check the leg-out at `j` against the leg-in at `i` and the base run.
    fn confirm(&self, candles: &[Candle], i: usize, run_start: usize, j: usize) -> Option<Zone> {
        let leg_in = &candles[i];
        let leg_out = &candles[j];
        let base = &candles[run_start..j];

        if !qualifies(leg_out, CandleRole::LegOut, &self.bands) {
            trace!(leg_in = i, leg_out = j, "leg-out body outside band");
            return None;
        }

        let breaks_out = match self.direction {
            Direction::Demand => {
                let base_high = base.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
                leg_out.is_bullish() && leg_out.close > leg_in.high && leg_out.close > base_high
            }
            Direction::Supply => {
                let base_low = base.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
                !leg_out.is_bullish() && leg_out.close < leg_in.low && leg_out.close < base_low
            }
        };
        if !breaks_out {
            trace!(leg_in = i, leg_out = j, "no directional breakout");
            return None;
        }

        Zone::from_pattern(i, j, base.to_vec(), self.direction)
    }
}

/// Validate `bands` and scan `candles` for zones in `direction`.
pub fn scan(
    candles: &[Candle],
    bands: &ScanBands,
    direction: Direction,
) -> Result<Vec<Zone>, ConfigError> {
    let scanner = ZoneScanner::new(bands.clone(), direction)?;
    Ok(scanner.scan(candles))
}
