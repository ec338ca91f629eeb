//! Supertrend: ATR bands around hl2 that ratchet toward price and flip
//! direction when the close crosses the active band.

use super::atr::{true_range, wilder_smooth};

/// Supertrend output. `directions[i]` is +1 when trending up (value is the
/// lower band), -1 when trending down (value is the upper band), and 0 during
/// warmup or on NaN input.
#[derive(Debug, Clone, PartialEq)]
pub struct SupertrendSeries {
    pub values: Vec<f64>,
    pub directions: Vec<i8>,
}

impl SupertrendSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn warmup(n: usize) -> Self {
        Self {
            values: vec![f64::NAN; n],
            directions: vec![0; n],
        }
    }
}

pub fn supertrend(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    multiplier: f64,
) -> SupertrendSeries {
    let n = highs.len().min(lows.len()).min(closes.len());
    let mut out = SupertrendSeries::warmup(n);

    let atr = wilder_smooth(&true_range(highs, lows, closes), period);
    let Some(start) = atr.iter().position(|v| !v.is_nan()) else {
        return out;
    };

    let hl2 = (highs[start] + lows[start]) / 2.0;
    let mut upper = hl2 + multiplier * atr[start];
    let mut lower = hl2 - multiplier * atr[start];
    let mut trending_up = true;
    out.values[start] = lower;
    out.directions[start] = 1;

    for i in (start + 1)..n {
        if atr[i].is_nan() || closes[i].is_nan() || highs[i].is_nan() || lows[i].is_nan() {
            continue;
        }

        let hl2 = (highs[i] + lows[i]) / 2.0;
        let basic_upper = hl2 + multiplier * atr[i];
        let basic_lower = hl2 - multiplier * atr[i];

        let prev_close = closes[i - 1];
        // Upper band only tightens while price stays below it; lower band mirrors.
        if !prev_close.is_nan() && prev_close <= upper {
            upper = basic_upper.min(upper);
        } else {
            upper = basic_upper;
        }
        if !prev_close.is_nan() && prev_close >= lower {
            lower = basic_lower.max(lower);
        } else {
            lower = basic_lower;
        }

        if trending_up && closes[i] < lower {
            trending_up = false;
        } else if !trending_up && closes[i] > upper {
            trending_up = true;
        }

        out.values[i] = if trending_up { lower } else { upper };
        out.directions[i] = if trending_up { 1 } else { -1 };
    }

    out
}
