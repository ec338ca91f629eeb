//! Property tests for the fusion, calibration and bracket invariants.
//!
//! 1. Scores stay in [-1, 1] when weights sum to 1
//! 2. classify at threshold 0 is the sign of the score
//! 3. Calibrated probability is non-decreasing in score
//! 4. The final threshold never drops below the configured one
//! 5. At most one bracket is ever outstanding
//! 6. A filled bracket ends with one child Completed and its sibling Canceled

use chrono::{Duration, TimeZone, Utc};
use confluence_core::bracket::{BracketOrderController, BracketParams, ControllerState};
use confluence_core::broker::{BrokerConfig, BrokerSimulator, SimBroker};
use confluence_core::calibration::{final_threshold, ProbabilityCalibrator};
use confluence_core::domain::{Candle, Interval, OrderStatus, OrderType};
use confluence_core::signals::{SignalAggregator, WeightSet};
use proptest::prelude::*;
use std::collections::BTreeMap;

const ORDER: [Interval; 3] = [Interval::M5, Interval::M15, Interval::H1];

// ── Strategies ───────────────────────────────────────────────────────

fn arb_signal() -> impl Strategy<Value = i8> {
    prop_oneof![Just(-1i8), Just(0i8), Just(1i8)]
}

fn arb_normalized_weights() -> impl Strategy<Value = WeightSet> {
    prop::array::uniform3(0.01..1.0f64).prop_map(|raw| {
        ORDER
            .iter()
            .zip(raw)
            .map(|(iv, w)| (iv.signal_name(), w))
            .collect::<WeightSet>()
            .normalized()
    })
}

fn arb_candles() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-0.02..0.02f64, 0.0..0.01f64, 0.0..0.01f64), 10..120).prop_map(|steps| {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut prev = 100.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (ret, up, down))| {
                let open = prev;
                let close = open * (1.0 + ret);
                prev = close;
                Candle {
                    timestamp: t0 + Duration::minutes(5 * i as i64),
                    open,
                    high: open.max(close) * (1.0 + up),
                    low: open.min(close) * (1.0 - down),
                    close,
                    volume: 1.0,
                }
            })
            .collect()
    })
}

// ── 1–2. Aggregation ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn score_bounded_when_weights_sum_to_one(
        weights in arb_normalized_weights(),
        sigs in prop::array::uniform3(arb_signal()),
    ) {
        let agg = SignalAggregator::new(&weights, &ORDER);
        let score = agg.score_row(&sigs);
        prop_assert!((-1.0 - 1e-12..=1.0 + 1e-12).contains(&score));

        let map: BTreeMap<String, i8> = ORDER.iter().zip(sigs).map(|(iv, s)| (iv.signal_name(), s)).collect();
        prop_assert_eq!(agg.score(&map), score);
    }

    #[test]
    fn classify_at_zero_is_sign(
        weights in arb_normalized_weights(),
        sigs in prop::array::uniform3(arb_signal()),
    ) {
        let agg = SignalAggregator::new(&weights, &ORDER);
        let map: BTreeMap<String, i8> = ORDER.iter().zip(sigs).map(|(iv, s)| (iv.signal_name(), s)).collect();
        let score = agg.score(&map);
        let expected = if score > 0.0 { 1 } else if score < 0.0 { -1 } else { 0 };
        prop_assert_eq!(agg.classify(&map, 0.0), expected);
    }
}

// ── 3–4. Calibration ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn probability_is_monotonic_in_score(
        samples in prop::collection::vec((-1.0..1.0f64, any::<bool>()), 4..200),
    ) {
        let scores: Vec<f64> = samples.iter().map(|s| s.0).collect();
        let labels: Vec<bool> = samples.iter().map(|s| s.1).collect();
        prop_assume!(labels.iter().any(|&l| l) && labels.iter().any(|&l| !l));

        let model = ProbabilityCalibrator::default().fit(&scores, &labels).unwrap();
        prop_assert!(model.slope >= 0.0);
        let grid: Vec<f64> = (-20..=20).map(|i| i as f64 / 10.0).collect();
        for w in grid.windows(2) {
            prop_assert!(model.predict_proba(w[0]) <= model.predict_proba(w[1]));
        }
    }

    #[test]
    fn final_threshold_never_below_configured(selected in 0.0..1.0f64, configured in 0.0..1.0f64) {
        let t = final_threshold(selected, configured);
        prop_assert!(t >= configured);
        prop_assert!(t >= selected);
    }
}

// ── 5–6. Bracket lifecycle ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn single_bracket_and_oco_resolution(
        candles in arb_candles(),
        signals in prop::collection::vec(arb_signal(), 120),
    ) {
        let mut broker = SimBroker::new(BrokerConfig::default());
        let params = BracketParams { sl_pct: 0.005, rr: 1.5 };
        let mut ctl = BracketOrderController::new(params);

        for (i, candle) in candles.iter().enumerate() {
            let notes = broker.process_bar(candle);
            ctl.on_notifications(&notes, Some(candle.timestamp), &mut broker);

            let live_entries = broker
                .orders()
                .filter(|o| o.order_type == OrderType::Market && o.is_live())
                .count();
            prop_assert!(live_entries <= 1);
            let live_parents: std::collections::HashSet<_> = broker
                .orders()
                .filter(|o| o.is_live())
                .map(|o| o.parent_id.unwrap_or(o.id))
                .collect();
            prop_assert!(live_parents.len() <= 1);
            if ctl.state() == ControllerState::Idle {
                prop_assert!(live_parents.is_empty());
                prop_assert!(broker.position().is_flat());
            }

            ctl.on_bar(i, signals[i], candle.close, &mut broker);
        }

        let entries: Vec<_> = broker
            .orders()
            .filter(|o| o.order_type == OrderType::Market)
            .map(|o| (o.id, o.status))
            .collect();
        let mut resolved = 0;
        for (entry, status) in entries {
            let children: Vec<OrderStatus> = broker
                .orders()
                .filter(|o| o.parent_id == Some(entry))
                .map(|o| o.status)
                .collect();
            prop_assert_eq!(children.len(), 2);
            if status != OrderStatus::Completed {
                prop_assert!(children.iter().all(|s| *s == OrderStatus::Canceled));
                continue;
            }
            let done = children.iter().filter(|s| **s == OrderStatus::Completed).count();
            let canceled = children.iter().filter(|s| **s == OrderStatus::Canceled).count();
            if done == 0 {
                // Still open at the end of data.
                prop_assert!(children.iter().all(|s| s.is_live()));
            } else {
                prop_assert_eq!((done, canceled), (1, 1));
                resolved += 1;
            }
        }
        prop_assert_eq!(ctl.trades().len(), resolved);
    }
}
