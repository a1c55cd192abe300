//! Zone lifecycle evaluation.
//!
//! Walks forward from a start index (conventionally the candle after the
//! leg-out). The first candle whose range overlaps the zone is the entry.
//! From the entry onward, inclusive, a demand zone resolves to
//! `TargetAchieved` when a high reaches `zone_high + multiple * risk`, or to
//! `Tested` when a low breaks below `zone_low`. Supply zones mirror this from
//! `zone_low`.
//!
//! Only the first entry is considered. An entry that never resolves before
//! the data ends reports `Fresh`, the same as a zone that was never entered,
//! unless `LifecycleConfig::strict_entry` is set.

use serde::{Deserialize, Serialize};

use crate::config::LifecycleConfig;
use crate::domain::{Candle, Direction, Zone, ZoneError, ZoneStatus};

/// Outcome of a lifecycle walk, with the indices that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub status: ZoneStatus,
    pub target_price: f64,
    /// First candle overlapping the zone, if any.
    pub entry_index: Option<usize>,
    /// Candle that hit the target or broke the zone, if any.
    pub resolution_index: Option<usize>,
}

/// Reward target for `zone` at `multiple` times its height.
pub fn target_price(zone: &Zone, multiple: f64) -> f64 {
    match zone.direction() {
        Direction::Demand => zone.zone_high() + multiple * zone.risk(),
        Direction::Supply => zone.zone_low() - multiple * zone.risk(),
    }
}

fn enters(zone: &Zone, candle: &Candle) -> bool {
    candle.low <= zone.zone_high() && candle.high >= zone.zone_low()
}

fn hits_target(zone: &Zone, candle: &Candle, target: f64) -> bool {
    match zone.direction() {
        Direction::Demand => candle.high >= target,
        Direction::Supply => candle.low <= target,
    }
}

fn breaks_zone(zone: &Zone, candle: &Candle) -> bool {
    match zone.direction() {
        Direction::Demand => candle.low < zone.zone_low(),
        Direction::Supply => candle.high > zone.zone_high(),
    }
}

/// Walk `candles` from `start_index` and report how the zone played out.
pub fn assess(
    zone: &Zone,
    candles: &[Candle],
    start_index: usize,
    config: &LifecycleConfig,
) -> Assessment {
    let target = target_price(zone, config.reward_risk_multiple);
    let unresolved = |entry_index: Option<usize>| Assessment {
        status: if entry_index.is_some() && config.strict_entry {
            ZoneStatus::Tested
        } else {
            ZoneStatus::Fresh
        },
        target_price: target,
        entry_index,
        resolution_index: None,
    };

    let forward = candles.get(start_index..).unwrap_or(&[]);
    let Some(offset) = forward.iter().position(|c| enters(zone, c)) else {
        return unresolved(None);
    };
    let entry = start_index + offset;

    for (k, candle) in candles.iter().enumerate().skip(entry) {
        let status = if hits_target(zone, candle, target) {
            ZoneStatus::TargetAchieved
        } else if breaks_zone(zone, candle) {
            ZoneStatus::Tested
        } else {
            continue;
        };
        return Assessment {
            status,
            target_price: target,
            entry_index: Some(entry),
            resolution_index: Some(k),
        };
    }

    unresolved(Some(entry))
}

/// Status of `zone` against `candles`, scanning from `start_index`.
pub fn evaluate(
    zone: &Zone,
    candles: &[Candle],
    start_index: usize,
    config: &LifecycleConfig,
) -> ZoneStatus {
    assess(zone, candles, start_index, config).status
}

/// Evaluate every zone from the candle after its leg-out and record the status.
///
/// `candles` must be the series the zone indices refer to.
pub fn evaluate_zones(
    zones: &mut [Zone],
    candles: &[Candle],
    config: &LifecycleConfig,
) -> Result<(), ZoneError> {
    for zone in zones.iter_mut() {
        let status = evaluate(zone, candles, zone.leg_out_index() + 1, config);
        zone.assign_status(status)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ohlc.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                Candle::on_date(start + chrono::Duration::days(i as i64), o, h, l, c).unwrap()
            })
            .collect()
    }

    /// Demand zone [107, 109] from leg-in 0 / leg-out 2; target 113 at 2R.
    fn demand_zone(candles: &[Candle]) -> Zone {
        Zone::from_pattern(0, 2, candles[1..2].to_vec(), Direction::Demand).unwrap()
    }

    fn prefix() -> Vec<(f64, f64, f64, f64)> {
        vec![
            (100.0, 110.0, 95.0, 108.0),
            (108.0, 109.0, 107.0, 108.0),
            (108.0, 115.0, 107.0, 114.0),
        ]
    }

    fn with_tail(tail: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let mut rows = prefix();
        rows.extend_from_slice(tail);
        series(&rows)
    }

    #[test]
    fn target_is_two_risk_above_zone_high() {
        let candles = with_tail(&[]);
        let zone = demand_zone(&candles);
        assert_eq!(target_price(&zone, 2.0), 113.0);
        assert_eq!(target_price(&zone, 3.0), 115.0);
    }

    #[test]
    fn entry_then_target_is_target_achieved() {
        let candles = with_tail(&[(112.0, 120.0, 108.0, 118.0)]);
        let zone = demand_zone(&candles);
        let a = assess(&zone, &candles, 3, &LifecycleConfig::default());
        assert_eq!(a.status, ZoneStatus::TargetAchieved);
        assert_eq!(a.entry_index, Some(3));
        assert_eq!(a.resolution_index, Some(3));
    }

    #[test]
    fn entry_then_break_is_tested() {
        let candles = with_tail(&[
            (111.0, 111.5, 108.5, 109.0), // enters
            (109.0, 109.5, 105.0, 106.0), // breaks below 107
            (106.0, 125.0, 106.0, 124.0),
        ]);
        let zone = demand_zone(&candles);
        let a = assess(&zone, &candles, 3, &LifecycleConfig::default());
        assert_eq!(a.status, ZoneStatus::Tested);
        assert_eq!(a.resolution_index, Some(4));
    }

    #[test]
    fn never_entered_is_fresh() {
        let candles = with_tail(&[(114.0, 118.0, 110.0, 117.0), (117.0, 130.0, 116.0, 129.0)]);
        let zone = demand_zone(&candles);
        let a = assess(&zone, &candles, 3, &LifecycleConfig::default());
        assert_eq!(a.status, ZoneStatus::Fresh);
        assert_eq!(a.entry_index, None);
    }

    #[test]
    fn entered_but_unresolved_is_fresh_unless_strict() {
        let candles = with_tail(&[(111.0, 111.5, 108.5, 109.0), (109.0, 110.0, 108.0, 109.5)]);
        let zone = demand_zone(&candles);
        let lenient = assess(&zone, &candles, 3, &LifecycleConfig::default());
        assert_eq!(lenient.status, ZoneStatus::Fresh);
        assert_eq!(lenient.entry_index, Some(3));

        let strict = LifecycleConfig {
            strict_entry: true,
            ..LifecycleConfig::default()
        };
        assert_eq!(evaluate(&zone, &candles, 3, &strict), ZoneStatus::Tested);
    }

    #[test]
    fn start_past_end_is_fresh() {
        let candles = with_tail(&[]);
        let zone = demand_zone(&candles);
        assert_eq!(
            evaluate(&zone, &candles, 99, &LifecycleConfig::default()),
            ZoneStatus::Fresh
        );
    }

    #[test]
    fn supply_mirror() {
        // supply zone [96, 98]; risk 2, target 92
        let candles = series(&[
            (108.0, 110.0, 95.0, 97.0),
            (97.0, 98.0, 96.0, 97.0),
            (97.0, 97.5, 90.0, 91.0),
            (91.0, 96.5, 90.5, 95.0), // enters from below
            (95.0, 95.5, 91.5, 92.0), // low 91.5 <= 92
        ]);
        let zone = Zone::from_pattern(0, 2, candles[1..2].to_vec(), Direction::Supply).unwrap();
        assert_eq!(target_price(&zone, 2.0), 92.0);
        assert_eq!(
            evaluate(&zone, &candles, 3, &LifecycleConfig::default()),
            ZoneStatus::TargetAchieved
        );
    }

    #[test]
    fn evaluate_zones_assigns_once() {
        let candles = with_tail(&[(112.0, 120.0, 108.0, 118.0)]);
        let mut zones = vec![demand_zone(&candles)];
        let config = LifecycleConfig::default();
        evaluate_zones(&mut zones, &candles, &config).unwrap();
        assert_eq!(zones[0].status(), Some(ZoneStatus::TargetAchieved));
        assert!(evaluate_zones(&mut zones, &candles, &config).is_err());
    }
}
