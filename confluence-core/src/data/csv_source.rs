//! CSV candle import.
//!
//! One file per symbol and interval: `<dir>/<SYMBOL>_<interval>.csv` with a
//! header row `timestamp,open,high,low,close,volume`. The timestamp column
//! accepts either epoch milliseconds or RFC 3339.

use super::provider::{check_range, finish_fetch, DataError, MarketDataSource};
use crate::domain::{Candle, Interval};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.dir.join(format!("{symbol}_{interval}.csv"))
    }

    fn read_file(path: &Path) -> Result<Vec<Candle>, DataError> {
        let csv_err = |reason: String| DataError::Csv {
            path: path.display().to_string(),
            reason,
        };

        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_err(e.to_string()))?;
        let mut candles = Vec::new();
        for record in reader.deserialize::<CsvRow>() {
            let row = record.map_err(|e| csv_err(e.to_string()))?;
            let timestamp = parse_timestamp(&row.timestamp)
                .ok_or_else(|| csv_err(format!("bad timestamp '{}'", row.timestamp)))?;
            candles.push(Candle {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }
        Ok(candles)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl MarketDataSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        check_range(start, end)?;
        let path = self.path_for(symbol, interval);
        if !path.exists() {
            return Err(DataError::Unavailable {
                symbol: symbol.to_string(),
                interval,
            });
        }
        let candles = Self::read_file(&path)?;
        finish_fetch(symbol, interval, start, end, candles)
    }
}
