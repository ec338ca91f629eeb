//! Confluence core: multi-timeframe signal fusion, probability calibration
//! and bracket-order simulation.
//!
//! - Domain types (candles, intervals, orders, positions, trades)
//! - Market data sources and the multi-timeframe merge
//! - RSI / Supertrend indicators and the per-interval signal generator
//! - Weighted signal aggregation and logistic calibration
//! - Simulated broker with bracket/OCO semantics and the bracket controller
//! - The decision engine that strings the stages together

pub mod bracket;
pub mod broker;
pub mod calibration;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod signals;

pub use error::PipelineError;
