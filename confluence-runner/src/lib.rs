//! Confluence Runner: config loading, source selection, search and reports.
//!
//! This crate builds on `confluence-core` to provide:
//! - TOML run configuration resolved into an immutable `StrategyConfig`
//! - Data source construction (Binance, CSV, synthetic) and in-memory snapshots
//! - Seeded parallel random search over weights, threshold and strategy params
//! - JSON/CSV run reports

pub mod config;
pub mod pipeline;
pub mod report;
pub mod search;

pub use config::{ConfigError, DataConfig, PipelineConfig, SearchConfig, StrategySection};
pub use pipeline::{build_source, run_strategy, snapshot, RunError};
pub use report::{export_equity_csv, export_trades_csv, save_report, RunReport};
pub use search::{RandomSearch, SearchOutcome, SearchSpace, Trial, TrialParams};
