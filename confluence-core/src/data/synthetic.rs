//! Synthetic candles for development and tests.
//!
//! Produces a random walk at one-minute resolution and aggregates it to the
//! requested interval, so every interval of the same symbol describes the
//! same price path. The walk is seeded from the symbol (BLAKE3) and anchored
//! at UTC midnight of the range start, so repeated fetches are identical.
//! These candles are clearly fake; runs on them are tagged as synthetic.

use super::provider::{check_range, finish_fetch, DataError, MarketDataSource};
use crate::domain::{Candle, Interval};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Minutes per drift regime.
const REGIME_MINUTES: usize = 240;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    start_price: f64,
    /// Per-minute return half-range.
    volatility: f64,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            start_price: 100.0,
            volatility: 0.0015,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    fn minute_path(&self, symbol: &str, anchor: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Candle> {
        let seed_bytes = blake3::hash(symbol.as_bytes());
        let seed: [u8; 32] = *seed_bytes.as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let minutes = ((end - anchor).num_minutes().max(0) + 1) as usize;
        let mut candles = Vec::with_capacity(minutes);
        let mut price = self.start_price;
        let mut drift = 0.0;

        for i in 0..minutes {
            if i % REGIME_MINUTES == 0 {
                drift = rng.gen_range(-0.3..0.3) * self.volatility;
            }
            let ret: f64 = drift + rng.gen_range(-self.volatility..self.volatility);
            let open = price;
            let close = (price * (1.0 + ret)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..self.volatility / 2.0));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..self.volatility / 2.0));
            let volume = rng.gen_range(1.0..100.0);

            candles.push(Candle {
                timestamp: anchor + Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                volume,
            });
            price = close;
        }
        candles
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate one-minute candles into epoch-aligned buckets of `interval`.
fn resample(minutes: &[Candle], interval: Interval) -> Vec<Candle> {
    let bucket_ms = interval.minutes() * 60_000;
    let mut out: Vec<Candle> = Vec::new();

    for c in minutes {
        let ms = c.timestamp.timestamp_millis();
        let bucket_start = ms - ms.rem_euclid(bucket_ms);
        match out.last_mut() {
            Some(last) if last.timestamp.timestamp_millis() == bucket_start => {
                last.high = last.high.max(c.high);
                last.low = last.low.min(c.low);
                last.close = c.close;
                last.volume += c.volume;
            }
            _ => {
                let Some(timestamp) = DateTime::from_timestamp_millis(bucket_start) else {
                    continue;
                };
                out.push(Candle { timestamp, ..*c });
            }
        }
    }
    out
}

impl MarketDataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        check_range(start, end)?;
        let anchor = start
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(start);
        let minutes = self.minute_path(symbol, anchor, end);
        let candles = resample(&minutes, interval);
        finish_fetch(symbol, interval, start, end, candles)
    }
}
