//! Indicator library.
//!
//! Indicators work on plain price slices so they can be fed the
//! forward-filled columns of a merged frame directly. Warmup slots are NaN.

pub mod atr;
pub mod rsi;
pub mod supertrend;

pub use atr::{true_range, wilder_smooth};
pub use rsi::rsi;
pub use supertrend::{supertrend, SupertrendSeries};

/// Computes the two indicators the signal generator consumes.
pub trait IndicatorLibrary: Send + Sync {
    fn rsi(&self, closes: &[f64], period: usize) -> Vec<f64>;

    fn supertrend(
        &self,
        highs: &[f64],
        lows: &[f64],
        closes: &[f64],
        period: usize,
        multiplier: f64,
    ) -> SupertrendSeries;
}

/// Wilder RSI and ATR-band Supertrend.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardIndicators;

impl IndicatorLibrary for StandardIndicators {
    fn rsi(&self, closes: &[f64], period: usize) -> Vec<f64> {
        rsi::rsi(closes, period)
    }

    fn supertrend(
        &self,
        highs: &[f64],
        lows: &[f64],
        closes: &[f64],
        period: usize,
        multiplier: f64,
    ) -> SupertrendSeries {
        supertrend::supertrend(highs, lows, closes, period, multiplier)
    }
}

/// Assert two f64 values are approximately equal.
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, epsilon={epsilon}"
    );
}

/// OHLC columns from closes: open = prev close, high/low one point outside the body.
#[cfg(test)]
pub fn ohlc_from_closes(closes: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut highs = Vec::with_capacity(closes.len());
    let mut lows = Vec::with_capacity(closes.len());
    for (i, &close) in closes.iter().enumerate() {
        let open = if i == 0 { close } else { closes[i - 1] };
        highs.push(open.max(close) + 1.0);
        lows.push(open.min(close) - 1.0);
    }
    (highs, lows, closes.to_vec())
}
