//! Market data source trait and structured error types.
//!
//! The `MarketDataSource` trait abstracts over candle sources (Binance REST,
//! CSV import, synthetic, in-memory) so the pipeline can swap implementations
//! and tests can run without network access.

use crate::domain::{Candle, Interval};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no candles for {symbol} {interval} in the requested range")]
    Unavailable { symbol: String, interval: Interval },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("csv error in {path}: {reason}")]
    Csv { path: String, reason: String },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Source of OHLCV candles.
///
/// `fetch` returns candles ordered by timestamp whose open time lies in
/// `[start, end]`. An empty result is reported as `DataError::Unavailable`,
/// never as `Ok(vec![])`.
pub trait MarketDataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError>;
}

/// Shared post-processing for sources: range check, sort, dedupe, empty check.
pub(crate) fn finish_fetch(
    symbol: &str,
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    mut candles: Vec<Candle>,
) -> Result<Vec<Candle>, DataError> {
    candles.retain(|c| c.timestamp >= start && c.timestamp <= end);
    candles.sort_by_key(|c| c.timestamp);
    // Keep the last candle for a repeated timestamp.
    candles.reverse();
    candles.dedup_by_key(|c| c.timestamp);
    candles.reverse();

    if candles.is_empty() {
        return Err(DataError::Unavailable {
            symbol: symbol.to_string(),
            interval,
        });
    }
    Ok(candles)
}

pub(crate) fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DataError> {
    if start > end {
        return Err(DataError::InvalidRange { start, end });
    }
    Ok(())
}
