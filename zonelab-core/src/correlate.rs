//! Higher/lower timeframe correlation.
//!
//! Zones found on the higher timeframe carve date windows
//! `[leg_in time, leg_out time]` out of the lower timeframe. The scanner runs
//! independently inside each window (a base run cannot span two disjoint
//! windows), and every lower-timeframe zone is linked to the first parent
//! whose window holds both its leg-in and leg-out timestamps.
//!
//! Child statuses are decided on the restricted series (lower candles inside
//! any parent window) unless `ChildSeries::Full` is configured.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;
use tracing::debug;

use crate::config::{ChildSeries, ConfigError, LifecycleConfig, ScanBands};
use crate::domain::{Candle, Direction, NestedZoneLink, Zone, ZoneError};
use crate::lifecycle::evaluate;
use crate::scanner::ZoneScanner;

/// Inclusive time span on the lower timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Window from the leg-in to the leg-out timestamp of `zone` on `candles`.
    pub fn of_zone(zone: &Zone, candles: &[Candle]) -> Option<Self> {
        Some(Self {
            start: candles.get(zone.leg_in_index())?.timestamp,
            end: candles.get(zone.leg_out_index())?.timestamp,
        })
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Index range of `candles` (sorted ascending) that falls in the window.
    pub fn slice_range(&self, candles: &[Candle]) -> Range<usize> {
        let lo = candles.partition_point(|c| c.timestamp < self.start);
        let hi = candles.partition_point(|c| c.timestamp <= self.end);
        lo..hi.max(lo)
    }
}

/// A lower-timeframe zone and, when one encloses it, the link to its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedZone {
    pub zone: Zone,
    pub link: Option<NestedZoneLink>,
}

/// Result of a two-timeframe run.
///
/// Child zone indices refer to the full lower-timeframe series, not to the
/// window they were found in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub parents: Vec<Zone>,
    pub windows: Vec<TimeWindow>,
    pub children: Vec<CorrelatedZone>,
}

impl Correlation {
    /// Resolve a child's link against the parent list.
    pub fn parent_of(&self, child: &CorrelatedZone) -> Option<&Zone> {
        child.link.and_then(|l| self.parents.get(l.parent_index))
    }

    /// Resolve a child's link to the parent's date window.
    pub fn window_of(&self, child: &CorrelatedZone) -> Option<&TimeWindow> {
        child.link.and_then(|l| self.windows.get(l.parent_index))
    }
}

/// Indices of `lower` inside any window, ascending, each listed once.
///
/// Consecutive parents may share a breakout candle, so windows can touch.
pub fn restricted_indices(lower: &[Candle], windows: &[TimeWindow]) -> Vec<usize> {
    let mut indices: Vec<usize> = windows.iter().flat_map(|w| w.slice_range(lower)).collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Lower-timeframe candles inside any window, in time order.
pub fn restricted_series(lower: &[Candle], windows: &[TimeWindow]) -> Vec<Candle> {
    restricted_indices(lower, windows)
        .into_iter()
        .map(|i| lower[i])
        .collect()
}

/// Evaluate every child zone from the candle after its leg-out and record
/// the status.
pub fn evaluate_children(
    correlation: &mut Correlation,
    lower: &[Candle],
    config: &LifecycleConfig,
    series: ChildSeries,
) -> Result<(), ZoneError> {
    match series {
        ChildSeries::Full => {
            for child in &mut correlation.children {
                let start = child.zone.leg_out_index() + 1;
                let status = evaluate(&child.zone, lower, start, config);
                child.zone.assign_status(status)?;
            }
        }
        ChildSeries::Restricted => {
            let indices = restricted_indices(lower, &correlation.windows);
            let candles = restricted_series(lower, &correlation.windows);
            for child in &mut correlation.children {
                // first restricted position after the leg-out
                let start = indices.partition_point(|&i| i <= child.zone.leg_out_index());
                let status = evaluate(&child.zone, &candles, start, config);
                child.zone.assign_status(status)?;
            }
        }
    }
    Ok(())
}

/// Run the two-timeframe correlation with an already validated scanner.
pub fn correlate_with(
    scanner: &ZoneScanner,
    higher: &[Candle],
    lower: &[Candle],
) -> Correlation {
    let parents = scanner.scan(higher);
    let windows: Vec<TimeWindow> = parents
        .iter()
        .filter_map(|z| TimeWindow::of_zone(z, higher))
        .collect();

    let mut seen = HashSet::new();
    let mut children = Vec::new();

    for window in &windows {
        let range = window.slice_range(lower);
        let offset = range.start;
        let found = scanner.scan(&lower[range]);
        debug!(
            start = %window.start,
            end = %window.end,
            direction = %scanner.direction(),
            zones = found.len(),
            "scanned lower-timeframe window"
        );

        for zone in found {
            let zone = zone.shifted(offset);
            if !seen.insert((zone.leg_in_index(), zone.leg_out_index())) {
                continue;
            }
            let leg_in_ts = lower[zone.leg_in_index()].timestamp;
            let leg_out_ts = lower[zone.leg_out_index()].timestamp;
            let link = windows
                .iter()
                .position(|w| w.contains(leg_in_ts) && w.contains(leg_out_ts))
                .map(|parent_index| NestedZoneLink { parent_index });
            children.push(CorrelatedZone { zone, link });
        }
    }

    Correlation {
        parents,
        windows,
        children,
    }
}

/// Validate `bands`, then correlate `lower` zones with enclosing `higher` zones.
pub fn correlate(
    higher: &[Candle],
    lower: &[Candle],
    bands: &ScanBands,
    direction: Direction,
) -> Result<Correlation, ConfigError> {
    let scanner = ZoneScanner::new(bands.clone(), direction)?;
    Ok(correlate_with(&scanner, higher, lower))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ZoneStatus;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, ohlc: (f64, f64, f64, f64)) -> Candle {
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        Candle::on_date(date, ohlc.0, ohlc.1, ohlc.2, ohlc.3).unwrap()
    }

    const LEG_IN: (f64, f64, f64, f64) = (100.0, 110.0, 95.0, 108.0);
    const BASE: (f64, f64, f64, f64) = (108.0, 109.0, 107.0, 108.0);
    const LEG_OUT: (f64, f64, f64, f64) = (108.0, 115.0, 107.0, 114.0);
    const FLAT: (f64, f64, f64, f64) = (50.0, 51.0, 49.0, 50.0);

    #[test]
    fn window_slice_is_inclusive() {
        let lower = vec![
            at(2024, 1, 1, FLAT),
            at(2024, 1, 2, FLAT),
            at(2024, 1, 3, FLAT),
            at(2024, 1, 4, FLAT),
        ];
        let w = TimeWindow {
            start: lower[1].timestamp,
            end: lower[2].timestamp,
        };
        assert_eq!(w.slice_range(&lower), 1..3);
        assert_eq!(restricted_series(&lower, &[w]).len(), 2);
    }

    #[test]
    fn empty_window_yields_empty_range() {
        let lower = vec![at(2024, 1, 1, FLAT), at(2024, 1, 10, FLAT)];
        let w = TimeWindow {
            start: at(2024, 1, 3, FLAT).timestamp,
            end: at(2024, 1, 5, FLAT).timestamp,
        };
        assert!(w.slice_range(&lower).is_empty());
    }

    #[test]
    fn child_zone_links_to_parent() {
        let higher = vec![
            at(2024, 1, 1, LEG_IN),
            at(2024, 2, 1, BASE),
            at(2024, 3, 1, LEG_OUT),
        ];
        let lower = vec![
            at(2023, 12, 29, LEG_IN), // before the window
            at(2024, 1, 2, FLAT),
            at(2024, 1, 3, LEG_IN),
            at(2024, 1, 4, BASE),
            at(2024, 1, 5, LEG_OUT),
            at(2024, 3, 4, FLAT), // after the window
        ];

        let c = correlate(&higher, &lower, &ScanBands::default(), Direction::Demand).unwrap();
        assert_eq!(c.parents.len(), 1);
        assert_eq!(c.children.len(), 1);
        let child = &c.children[0];
        assert_eq!(child.zone.leg_in_index(), 2);
        assert_eq!(child.zone.leg_out_index(), 4);
        assert_eq!(child.link, Some(NestedZoneLink { parent_index: 0 }));
        assert_eq!(c.parent_of(child), Some(&c.parents[0]));
    }

    #[test]
    fn no_parent_zones_means_no_children() {
        let higher = vec![at(2024, 1, 1, FLAT), at(2024, 2, 1, FLAT), at(2024, 3, 1, FLAT)];
        let lower = vec![
            at(2024, 1, 3, LEG_IN),
            at(2024, 1, 4, BASE),
            at(2024, 1, 5, LEG_OUT),
        ];
        let c = correlate(&higher, &lower, &ScanBands::default(), Direction::Demand).unwrap();
        assert!(c.parents.is_empty());
        assert!(c.children.is_empty());
    }

    #[test]
    fn scan_restarts_at_window_boundary() {
        // Two parents; a leg-in at the end of window 1 must not pair with a
        // base and leg-out that only exist in window 2.
        let higher = vec![
            at(2024, 1, 1, LEG_IN),
            at(2024, 2, 1, BASE),
            at(2024, 3, 1, LEG_OUT),
            at(2024, 4, 1, FLAT),
            at(2024, 5, 1, LEG_IN),
            at(2024, 6, 1, BASE),
            at(2024, 7, 1, LEG_OUT),
        ];
        let lower = vec![
            at(2024, 1, 2, FLAT),
            at(2024, 2, 28, FLAT),
            at(2024, 3, 1, LEG_IN),
            at(2024, 5, 1, BASE),
            at(2024, 5, 2, LEG_OUT),
            at(2024, 5, 3, FLAT),
        ];
        let c = correlate(&higher, &lower, &ScanBands::default(), Direction::Demand).unwrap();
        assert_eq!(c.parents.len(), 2);
        assert!(c.children.is_empty());
        // scanning the concatenation would have found the cross-window pattern
        let joined = restricted_series(&lower, &c.windows);
        assert_eq!(joined.len(), lower.len());
        assert_eq!(
            crate::scanner::scan(&joined, &ScanBands::default(), Direction::Demand)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn touching_windows_list_shared_candle_once() {
        let lower = vec![
            at(2024, 1, 1, FLAT),
            at(2024, 1, 2, FLAT),
            at(2024, 1, 3, FLAT),
        ];
        let first = TimeWindow {
            start: lower[0].timestamp,
            end: lower[1].timestamp,
        };
        let second = TimeWindow {
            start: lower[1].timestamp,
            end: lower[2].timestamp,
        };
        assert_eq!(restricted_indices(&lower, &[first, second]), vec![0, 1, 2]);
    }

    fn two_windows_with_gap() -> (Vec<Candle>, Vec<Candle>) {
        let higher = vec![
            at(2024, 1, 1, LEG_IN),
            at(2024, 2, 1, BASE),
            at(2024, 3, 1, LEG_OUT),
            at(2024, 4, 1, FLAT),
            at(2024, 5, 1, LEG_IN),
            at(2024, 6, 1, BASE),
            at(2024, 7, 1, LEG_OUT),
        ];
        let lower = vec![
            at(2024, 1, 2, LEG_IN),
            at(2024, 1, 3, BASE),
            at(2024, 1, 4, LEG_OUT),
            // between the windows: enters and breaks below 107
            at(2024, 4, 10, (108.0, 108.5, 105.0, 106.0)),
            // inside the second window: enters and reaches the 113 target
            at(2024, 5, 2, (110.0, 120.0, 108.0, 118.0)),
        ];
        (higher, lower)
    }

    #[test]
    fn restricted_children_skip_candles_between_windows() {
        let (higher, lower) = two_windows_with_gap();
        let mut c = correlate(&higher, &lower, &ScanBands::default(), Direction::Demand).unwrap();
        assert_eq!(c.windows.len(), 2);
        assert_eq!(c.children.len(), 1);

        evaluate_children(
            &mut c,
            &lower,
            &LifecycleConfig::default(),
            ChildSeries::Restricted,
        )
        .unwrap();
        assert_eq!(c.children[0].zone.status(), Some(ZoneStatus::TargetAchieved));
    }

    #[test]
    fn full_children_see_every_lower_candle() {
        let (higher, lower) = two_windows_with_gap();
        let mut c = correlate(&higher, &lower, &ScanBands::default(), Direction::Demand).unwrap();

        evaluate_children(&mut c, &lower, &LifecycleConfig::default(), ChildSeries::Full).unwrap();
        assert_eq!(c.children[0].zone.status(), Some(ZoneStatus::Tested));
    }
}
