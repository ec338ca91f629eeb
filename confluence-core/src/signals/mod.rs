//! Per-timeframe signal generation and cross-timeframe aggregation.
//!
//! Signals are pure functions of OHLC columns: they never see broker or
//! position state, and the same input always yields the same output.

pub mod aggregator;
pub mod rsi_supertrend;

pub use aggregator::{SignalAggregator, WeightSet};
pub use rsi_supertrend::{RsiSupertrend, SignalParams};

use crate::domain::Candle;

/// Turns one interval's OHLC columns into a discrete signal per bar.
///
/// Output values are -1 (short), 0 (neutral) or +1 (long), one per input bar.
pub trait SignalGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Bars needed before the generator can emit a non-zero value.
    fn lookback(&self) -> usize;

    fn generate(&self, highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<i8>;

    fn generate_candles(&self, candles: &[Candle]) -> Vec<i8> {
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.generate(&highs, &lows, &closes)
    }
}
