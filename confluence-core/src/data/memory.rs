//! In-memory candle source.
//!
//! Holds a read-only snapshot of candles keyed by (symbol, interval). Used by
//! tests and by the search driver, which fetches once and shares the snapshot
//! across parallel trials.

use super::provider::{check_range, finish_fetch, DataError, MarketDataSource};
use crate::domain::{Candle, Interval};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: HashMap<(String, Interval), Vec<Candle>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, interval: Interval, candles: Vec<Candle>) {
        self.series.insert((symbol.to_string(), interval), candles);
    }

    pub fn with_series(mut self, symbol: &str, interval: Interval, candles: Vec<Candle>) -> Self {
        self.insert(symbol, interval, candles);
        self
    }

    /// Snapshot every requested interval from another source.
    pub fn snapshot(
        source: &dyn MarketDataSource,
        symbol: &str,
        intervals: &[Interval],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, DataError> {
        let mut memory = Self::new();
        for &interval in intervals {
            let candles = source.fetch(symbol, interval, start, end)?;
            memory.insert(symbol, interval, candles);
        }
        Ok(memory)
    }
}

impl MarketDataSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        check_range(start, end)?;
        let candles = self
            .series
            .get(&(symbol.to_string(), interval))
            .cloned()
            .unwrap_or_default();
        finish_fetch(symbol, interval, start, end, candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candles(n: usize) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                timestamp: t0 + Duration::minutes(5 * i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn fetch_filters_range() {
        let source = MemorySource::new().with_series("BTCUSDT", Interval::M5, candles(10));
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let got = source
            .fetch("BTCUSDT", Interval::M5, t0 + Duration::minutes(10), t0 + Duration::minutes(20))
            .unwrap();
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn missing_series_is_unavailable() {
        let source = MemorySource::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = source
            .fetch("BTCUSDT", Interval::H1, t0, t0 + Duration::days(1))
            .unwrap_err();
        assert!(matches!(err, DataError::Unavailable { .. }));
    }
}
