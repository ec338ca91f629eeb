//! End-to-end tests: merge, signal fusion, calibration and the backtest on
//! deterministic synthetic data.

use chrono::{DateTime, Duration, TimeZone, Utc};
use confluence_core::calibration::{final_threshold, roc_auc, ProbabilityCalibrator};
use confluence_core::data::{merge, MarketDataSource, MemorySource, SyntheticSource};
use confluence_core::domain::{Candle, Interval};
use confluence_core::engine::{StrategyConfig, TradeDecisionEngine};
use confluence_core::signals::{SignalAggregator, WeightSet};
use confluence_core::PipelineError;
use std::collections::BTreeMap;
use std::sync::Arc;

fn range(days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    (start, start + Duration::days(days))
}

const INTERVALS: [Interval; 3] = [Interval::M5, Interval::M15, Interval::H1];

#[test]
fn merge_keeps_one_row_per_base_candle() {
    let (start, end) = range(2);
    let source = SyntheticSource::new();
    let base = source.fetch("BTCUSDT", Interval::M5, start, end).unwrap();

    let frame = merge(&source, "BTCUSDT", &[Interval::H1, Interval::M5, Interval::M15], start, end).unwrap();
    assert_eq!(frame.base, Interval::M5);
    assert_eq!(frame.len(), base.len());
    assert!(frame.timestamps.windows(2).all(|w| w[0] < w[1]));
    // Synthetic buckets are epoch-aligned, so every column resolves from row 0.
    assert_eq!(frame.incomplete_prefix_len(), 0);
    for iv in INTERVALS {
        assert!(frame.column(iv).unwrap().iter().all(|c| !c.is_void()));
    }
}

#[test]
fn merge_prefix_is_bounded_by_the_coarsest_interval() {
    let (start, end) = range(2);
    let source = SyntheticSource::new();
    let mut memory = MemorySource::new();
    for iv in INTERVALS {
        memory.insert("BTCUSDT", iv, source.fetch("BTCUSDT", iv, start, end).unwrap());
    }
    // Remove the first two hourly candles: 24 base rows stay unresolved.
    let mut hourly = source.fetch("BTCUSDT", Interval::H1, start, end).unwrap();
    hourly.drain(..2);
    memory.insert("BTCUSDT", Interval::H1, hourly);

    let frame = merge(&memory, "BTCUSDT", &INTERVALS, start, end).unwrap();
    assert_eq!(frame.incomplete_prefix_len(), 24);
    assert!((24..frame.len()).all(|i| frame.is_row_complete(i)));
}

#[test]
fn missing_interval_is_data_unavailable() {
    let (start, end) = range(1);
    let source = SyntheticSource::new();
    let memory = MemorySource::new().with_series(
        "BTCUSDT",
        Interval::M5,
        source.fetch("BTCUSDT", Interval::M5, start, end).unwrap(),
    );
    let err = merge(&memory, "BTCUSDT", &[Interval::M5, Interval::H1], start, end).unwrap_err();
    assert!(matches!(err, PipelineError::DataUnavailable { interval: Interval::H1, .. }));
}

#[test]
fn consensus_example_scores_point_six() {
    let weights = WeightSet::new()
        .with("sig_5m", 0.4)
        .with("sig_15m", 0.4)
        .with("sig_1h", 0.2);
    let agg = SignalAggregator::new(&weights, &INTERVALS);
    let signals: BTreeMap<String, i8> = [("sig_5m", 1), ("sig_15m", 1), ("sig_1h", -1)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    assert_eq!(agg.score(&signals), 0.4 * 1.0 + 0.4 * 1.0 + 0.2 * -1.0);
    assert!((agg.score(&signals) - 0.6).abs() < 1e-12);
}

#[test]
fn separable_scores_calibrate_perfectly() {
    let scores: Vec<f64> = (-10..=10).map(|i| i as f64 / 10.0).collect();
    let labels: Vec<bool> = scores.iter().map(|&s| s > 0.0).collect();

    let cal = ProbabilityCalibrator::default();
    let model = cal.fit(&scores, &labels).unwrap();
    let probs = model.predict_all(&scores);
    assert_eq!(roc_auc(&labels, &probs), 1.0);
    assert_eq!(model.auc, 1.0);
    assert!(probs.windows(2).all(|w| w[0] <= w[1]));

    // Any cut between the two groups separates them perfectly.
    let selected = cal.select_threshold(&model, &scores, &labels).unwrap();
    assert!(selected > model.predict_proba(0.0) && selected <= model.predict_proba(0.1));
}

#[test]
fn configured_threshold_is_a_floor() {
    assert_eq!(final_threshold(0.75, 0.8), 0.8);
    assert_eq!(final_threshold(0.9, 0.8), 0.9);
}

fn synthetic_config(days: i64) -> StrategyConfig {
    let (start, end) = range(days);
    StrategyConfig::new("BTCUSDT", INTERVALS.to_vec(), start, end)
}

#[test]
fn full_run_on_synthetic_data() {
    let engine = TradeDecisionEngine::new(synthetic_config(5), Arc::new(SyntheticSource::new())).unwrap();
    let out = engine.run().unwrap();

    let n = out.frame.len();
    assert!(n > 1000);
    assert_eq!(out.frame.score.len(), n);
    assert_eq!(out.frame.probability.len(), n);
    assert_eq!(out.frame.trade_signal.len(), n);
    assert_eq!(out.calibration.samples, n - 1);
    assert!(out.calibration.final_threshold >= 0.8);
    assert!(out.calibration.model.slope >= 0.0);
    assert!(out.frame.probability.iter().all(|p| (0.0..=1.0).contains(p)));

    let row = out.frame.row(n / 2).unwrap();
    assert_eq!(row.signals.len(), 3);
    assert!(row.score.is_some() && row.trade_signal.is_some());

    assert_eq!(out.backtest.equity_curve.len(), n);
    assert!(out.final_value().is_finite());
    assert!(out.backtest.trades.len() <= out.backtest.entries_submitted);
}

#[test]
fn runs_are_deterministic() {
    let a = TradeDecisionEngine::new(synthetic_config(3), Arc::new(SyntheticSource::new()))
        .unwrap()
        .run()
        .unwrap();
    let b = TradeDecisionEngine::new(synthetic_config(3), Arc::new(SyntheticSource::new()))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(a.final_value(), b.final_value());
    assert_eq!(a.frame.trade_signal, b.frame.trade_signal);
}

#[test]
fn flat_market_is_insufficient_for_calibration() {
    let (start, end) = range(1);
    let flat: Vec<Candle> = (0..288)
        .map(|i| Candle {
            timestamp: start + Duration::minutes(5 * i),
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 1.0,
        })
        .collect();
    let memory = MemorySource::new().with_series("FLAT", Interval::M5, flat);
    let config = StrategyConfig::new("FLAT", vec![Interval::M5], start, end);
    let err = TradeDecisionEngine::new(config, Arc::new(memory)).unwrap().run().unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData { classes: 1, .. }));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let config = synthetic_config(1).with_probability_threshold(2.0);
    let err = TradeDecisionEngine::new(config, Arc::new(SyntheticSource::new())).err();
    assert!(matches!(err, Some(PipelineError::InvalidConfig(_))));
}
