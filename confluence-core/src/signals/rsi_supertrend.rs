//! RSI extreme confirmed by Supertrend direction.
//!
//! Long when RSI is oversold while Supertrend points up; short when RSI is
//! overbought while Supertrend points down. Anything else, including warmup
//! NaN, is neutral.

use super::SignalGenerator;
use crate::indicators::{IndicatorLibrary, StandardIndicators};
use serde::{Deserialize, Serialize};

/// Indicator parameters shared by every interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParams {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub st_period: usize,
    pub st_multiplier: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            rsi_period: 3,
            rsi_overbought: 80.0,
            rsi_oversold: 20.0,
            st_period: 10,
            st_multiplier: 3.0,
        }
    }
}

impl SignalParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.rsi_period == 0 || self.st_period == 0 {
            return Err("indicator periods must be >= 1".into());
        }
        if self.st_multiplier.is_nan() || self.st_multiplier <= 0.0 {
            return Err(format!("st_multiplier must be > 0, got {}", self.st_multiplier));
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(format!(
                "need 0 <= rsi_oversold < rsi_overbought <= 100, got {} / {}",
                self.rsi_oversold, self.rsi_overbought
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RsiSupertrend<I = StandardIndicators> {
    params: SignalParams,
    indicators: I,
    name: String,
}

impl RsiSupertrend<StandardIndicators> {
    pub fn new(params: SignalParams) -> Self {
        Self::with_indicators(params, StandardIndicators)
    }
}

impl<I: IndicatorLibrary> RsiSupertrend<I> {
    pub fn with_indicators(params: SignalParams, indicators: I) -> Self {
        Self {
            name: format!(
                "rsi{}_st{}x{}",
                params.rsi_period, params.st_period, params.st_multiplier
            ),
            params,
            indicators,
        }
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }
}

impl<I: IndicatorLibrary> SignalGenerator for RsiSupertrend<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.params.rsi_period.max(self.params.st_period)
    }

    fn generate(&self, highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<i8> {
        let p = &self.params;
        let rsi = self.indicators.rsi(closes, p.rsi_period);
        let st = self
            .indicators
            .supertrend(highs, lows, closes, p.st_period, p.st_multiplier);

        rsi.iter()
            .zip(&st.directions)
            .map(|(&r, &dir)| {
                // NaN comparisons are false, so warmup falls through to 0.
                if r < p.rsi_oversold && dir == 1 {
                    1
                } else if r > p.rsi_overbought && dir == -1 {
                    -1
                } else {
                    0
                }
            })
            .collect()
    }
}
