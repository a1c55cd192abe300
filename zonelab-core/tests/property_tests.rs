//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Zero-range candles have a body percentage of 0
//! 2. Scans are deterministic and ordered by leg-in index
//! 3. Consecutive zones never overlap (they may share the breakout candle)
//! 4. Target price identity for every evaluated zone, both directions
//! 5. Evaluation is idempotent
//! 6. Supply zones resolve only at or after their entry, by the mirrored rules

use chrono::NaiveDate;
use proptest::prelude::*;
use zonelab_core::{
    assess, evaluate, scan, target_price, Candle, ClassificationBand, Direction, LifecycleConfig,
    ScanBands, Zone, ZoneStatus,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_candle_shape() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (
        (10.0..200.0_f64),
        (-5.0..5.0_f64),
        (0.0..3.0_f64),
        (0.0..3.0_f64),
    )
        .prop_map(|(open, body, upper, lower)| {
            let close = open + body;
            let high = open.max(close) + upper;
            let low = open.min(close) - lower;
            (open, high, low, close)
        })
}

fn arb_series(max_len: usize) -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec(arb_candle_shape(), 0..max_len).prop_map(|shapes| {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        shapes
            .into_iter()
            .enumerate()
            .map(|(i, (o, h, l, c))| {
                Candle::on_date(start + chrono::Duration::days(i as i64), o, h, l, c).unwrap()
            })
            .collect()
    })
}

fn arb_bands() -> impl Strategy<Value = ScanBands> {
    ((30.0..70.0_f64), (20.0..60.0_f64), 1usize..3, 0usize..4).prop_map(
        |(leg, base_max, min_count, extra)| ScanBands {
            leg_in: ClassificationBand::new(leg, 100.0),
            base: ClassificationBand::new(0.0, base_max),
            leg_out: ClassificationBand::new(leg, 100.0),
            min_base_count: min_count,
            max_base_count: min_count + extra,
        },
    )
}

/// A zone built straight from 1..=4 base candles, independent of scanning.
fn arb_zone(direction: Direction) -> impl Strategy<Value = Zone> {
    prop::collection::vec(arb_candle_shape(), 1..5).prop_map(move |shapes| {
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let base: Vec<Candle> = shapes
            .into_iter()
            .enumerate()
            .map(|(i, (o, h, l, c))| {
                Candle::on_date(start + chrono::Duration::days(i as i64), o, h, l, c).unwrap()
            })
            .collect();
        let leg_out = base.len() + 1;
        Zone::from_pattern(0, leg_out, base, direction).unwrap()
    })
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Demand), Just(Direction::Supply)]
}

// ── 1. Degenerate candles ────────────────────────────────────────────

proptest! {
    #[test]
    fn zero_range_body_is_zero(price in 1.0..1000.0_f64, drift in -1.0..1.0_f64) {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        // open/close may differ from high/low; only the range matters
        let c = Candle {
            timestamp: date.and_hms_opt(0, 0, 0).unwrap(),
            open: price + drift,
            high: price,
            low: price,
            close: price - drift,
        };
        prop_assert_eq!(c.body_percentage(), 0.0);
    }

    #[test]
    fn body_percentage_bounded_for_sane_candles(shape in arb_candle_shape()) {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let c = Candle::on_date(date, shape.0, shape.1, shape.2, shape.3).unwrap();
        let pct = c.body_percentage();
        prop_assert!((0.0..=100.0 + 1e-9).contains(&pct));
    }
}

// ── 2-3. Scan determinism and ordering ───────────────────────────────

proptest! {
    #[test]
    fn scan_is_deterministic(
        candles in arb_series(120),
        bands in arb_bands(),
        direction in arb_direction(),
    ) {
        let a = scan(&candles, &bands, direction).unwrap();
        let b = scan(&candles, &bands, direction).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn zones_ascend_without_overlap(
        candles in arb_series(120),
        bands in arb_bands(),
        direction in arb_direction(),
    ) {
        let zones = scan(&candles, &bands, direction).unwrap();
        for z in &zones {
            prop_assert!(z.leg_in_index() < z.leg_out_index());
            prop_assert!(z.leg_out_index() < candles.len());
            let k = z.base_candles().len();
            prop_assert_eq!(z.leg_out_index() - z.leg_in_index() - 1, k);
            prop_assert!(k >= bands.min_base_count && k <= bands.max_base_count);
            prop_assert!(z.zone_low() <= z.zone_high());
        }
        for pair in zones.windows(2) {
            prop_assert!(pair[0].leg_in_index() < pair[1].leg_in_index());
            prop_assert!(pair[1].leg_in_index() >= pair[0].leg_out_index());
        }
    }
}

// ── 4-5. Lifecycle ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn demand_target_identity(
        candles in arb_series(120),
        bands in arb_bands(),
        multiple in 0.5..5.0_f64,
    ) {
        for zone in scan(&candles, &bands, Direction::Demand).unwrap() {
            let expected = zone.zone_high() + multiple * (zone.zone_high() - zone.zone_low());
            prop_assert_eq!(target_price(&zone, multiple), expected);
        }
    }

    #[test]
    fn supply_target_identity(
        candles in arb_series(120),
        bands in arb_bands(),
        multiple in 0.5..5.0_f64,
    ) {
        for zone in scan(&candles, &bands, Direction::Supply).unwrap() {
            let expected = zone.zone_low() - multiple * (zone.zone_high() - zone.zone_low());
            prop_assert_eq!(target_price(&zone, multiple), expected);
        }
    }

    #[test]
    fn supply_target_identity_on_built_zones(
        zone in arb_zone(Direction::Supply),
        multiple in 0.5..5.0_f64,
    ) {
        let expected = zone.zone_low() - multiple * (zone.zone_high() - zone.zone_low());
        prop_assert_eq!(target_price(&zone, multiple), expected);
        prop_assert!(target_price(&zone, multiple) <= zone.zone_low());
    }

    #[test]
    fn evaluation_is_idempotent(
        candles in arb_series(120),
        bands in arb_bands(),
        direction in arb_direction(),
        strict in any::<bool>(),
    ) {
        let config = LifecycleConfig { reward_risk_multiple: 2.0, strict_entry: strict };
        for zone in scan(&candles, &bands, direction).unwrap() {
            let start = zone.leg_out_index() + 1;
            let first = evaluate(&zone, &candles, start, &config);
            let second = evaluate(&zone, &candles, start, &config);
            prop_assert_eq!(first, second);
            if start >= candles.len() {
                prop_assert_eq!(first, ZoneStatus::Fresh);
            }
        }
    }
}

// ── 6. Supply resolution ─────────────────────────────────────────────

proptest! {
    #[test]
    fn supply_resolves_at_or_after_entry(
        zone in arb_zone(Direction::Supply),
        candles in arb_series(60),
        start in 0usize..10,
        multiple in 0.5..4.0_f64,
        strict in any::<bool>(),
    ) {
        let config = LifecycleConfig { reward_risk_multiple: multiple, strict_entry: strict };
        let a = assess(&zone, &candles, start, &config);
        prop_assert_eq!(a.target_price, target_price(&zone, multiple));

        let enters = |c: &Candle| c.low <= zone.zone_high() && c.high >= zone.zone_low();
        match a.entry_index {
            None => {
                prop_assert!(candles.iter().skip(start).all(|c| !enters(c)));
                prop_assert_eq!(a.status, ZoneStatus::Fresh);
                prop_assert_eq!(a.resolution_index, None);
            }
            Some(entry) => {
                prop_assert!(entry >= start);
                prop_assert!(enters(&candles[entry]));
                prop_assert!(candles[start..entry].iter().all(|c| !enters(c)));

                let hit = |c: &Candle| c.low <= a.target_price;
                let broke = |c: &Candle| c.high > zone.zone_high();
                match a.resolution_index {
                    Some(res) => {
                        prop_assert!(res >= entry);
                        prop_assert!(candles[entry..res].iter().all(|c| !hit(c) && !broke(c)));
                        let c = &candles[res];
                        match a.status {
                            ZoneStatus::TargetAchieved => prop_assert!(hit(c)),
                            ZoneStatus::Tested => prop_assert!(!hit(c) && broke(c)),
                            ZoneStatus::Fresh => prop_assert!(false, "resolved zone reported Fresh"),
                        }
                    }
                    None => {
                        prop_assert!(candles[entry..].iter().all(|c| !hit(c) && !broke(c)));
                        let expected = if strict { ZoneStatus::Tested } else { ZoneStatus::Fresh };
                        prop_assert_eq!(a.status, expected);
                    }
                }
            }
        }
    }
}
