//! Decision pipeline and bar-by-bar backtest.
//!
//! Stages run in strict sequence per run:
//!
//! 1. `prepare_data`: fetch and merge every interval, drop the incomplete prefix
//! 2. `compute_signals`: per-interval signal columns and the consensus score
//! 3. `calibrate`: one-shot logistic fit and threshold selection
//! 4. `decide`: probability and trade signal per row
//!
//! The backtest then replays the base candles through a broker and the
//! bracket controller, one decision per bar close.

pub mod backtest;
pub mod config;
pub mod decision;

pub use backtest::{run_backtest, BacktestOutcome, EquityPoint};
pub use config::StrategyConfig;
pub use decision::{label_next_return, trade_signal, Calibration, PipelineOutcome, TradeDecisionEngine};
