//! End-to-end runner tests on synthetic data: config file → search → report.

use chrono::{TimeZone, Utc};
use confluence_core::domain::Interval;
use confluence_core::engine::StrategyConfig;
use confluence_runner::{
    build_source, run_strategy, save_report, DataConfig, PipelineConfig, RandomSearch, RunReport,
    SearchConfig,
};

fn base_config() -> StrategyConfig {
    StrategyConfig::new(
        "BTCUSDT",
        vec![Interval::M5, Interval::M15, Interval::H1],
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
    )
}

fn search(seed: u64, parallel: bool) -> confluence_runner::SearchOutcome {
    let source = build_source(&DataConfig::Synthetic { volatility: None }).unwrap();
    RandomSearch::new(SearchConfig {
        trials: 6,
        seed,
        tune_strategy: true,
    })
    .with_parallelism(parallel)
    .run(&base_config(), source.as_ref())
    .unwrap()
}

#[test]
fn search_is_deterministic_per_seed() {
    let a = search(7, true);
    let b = search(7, false);

    assert_eq!(a.trials.len(), 6);
    assert_eq!(a.best.index, b.best.index);
    assert_eq!(a.best.params, b.best.params);
    assert_eq!(a.best.final_value, b.best.final_value);
    for (x, y) in a.trials.iter().zip(&b.trials) {
        assert_eq!(x.params, y.params);
        assert_eq!(x.final_value, y.final_value);
    }

    let c = search(8, true);
    assert_ne!(a.trials[0].params, c.trials[0].params);
}

#[test]
fn best_trial_has_the_highest_final_value() {
    let out = search(11, true);
    let best = out.best.final_value.unwrap();
    assert!(out
        .trials
        .iter()
        .filter_map(|t| t.final_value)
        .all(|v| v <= best));
    assert_eq!(out.trials.iter().map(|t| t.index).collect::<Vec<_>>(), (0..6).collect::<Vec<_>>());

    // Replaying the best config on the snapshot reproduces its equity.
    let replay = run_strategy(out.best_config.clone(), out.data.clone()).unwrap();
    assert_eq!(Some(replay.final_value()), out.best.final_value);
}

#[test]
fn config_file_to_report_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("run.toml");
    std::fs::write(
        &config_path,
        r#"
        symbol = "BTCUSDT"
        intervals = ["5m", "1h"]
        start = "2024-01-01"
        end = "2024-01-03"

        [data]
        source = "synthetic"
        "#,
    )
    .unwrap();

    let config = PipelineConfig::from_file(&config_path).unwrap();
    let strategy = config.to_strategy().unwrap();
    let source = build_source(&config.data).unwrap();
    let outcome = run_strategy(strategy.clone(), source).unwrap();

    let report = RunReport::new(&strategy, &outcome, "synthetic");
    let out_dir = dir.path().join("out");
    let path = save_report(&report, &outcome, &out_dir).unwrap();

    assert!(out_dir.join("trades.csv").exists());
    assert!(out_dir.join("equity.csv").exists());

    let json = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    for key in ["symbol", "start", "end", "final_value", "weights", "probability_threshold"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["symbol"], "BTCUSDT");
    assert_eq!(value["start"], "2024-01-01");
    assert_eq!(value["weights"]["sig_5m"], 0.5);
    assert_eq!(value["config_id"].as_str().unwrap().len(), 64);

    let parsed = RunReport::from_json(&json).unwrap();
    assert_eq!(parsed.final_value, outcome.final_value());
    assert_eq!(parsed.trades, outcome.backtest.trades.len());
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PipelineConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, confluence_runner::ConfigError::Io { .. }));
}
