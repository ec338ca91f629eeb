//! True range and Wilder smoothing, shared by the Supertrend bands.

/// TR[0] = high - low; TR[t] = max(high - low, |high - prev_close|, |low - prev_close|).
pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = highs.len().min(lows.len()).min(closes.len());
    let mut tr = vec![f64::NAN; n];
    if n == 0 {
        return tr;
    }

    tr[0] = highs[0] - lows[0];
    for i in 1..n {
        let (h, l, pc) = (highs[i], lows[i], closes[i - 1]);
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    // max() swallows NaN operands; restore propagation explicitly.
    for i in 0..n {
        let prev_close_nan = i > 0 && closes[i - 1].is_nan();
        if highs[i].is_nan() || lows[i].is_nan() || prev_close_nan {
            tr[i] = f64::NAN;
        }
    }
    tr
}

/// Wilder smoothing (alpha = 1/period), seeded with the mean of the first
/// `period` consecutive non-NaN values. A NaN after the seed ends the series.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let Some(seed_start) = (0..=n - period)
        .find(|&i| values[i..i + period].iter().all(|v| !v.is_nan()))
    else {
        return result;
    };
    let seed_end = seed_start + period;

    let mut prev = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}
