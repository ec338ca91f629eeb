//! Binance USDT-M futures kline source.
//!
//! Fetches historical klines from the public `/fapi/v1/klines` endpoint,
//! paging forward `limit` candles at a time until the end of the range.
//! Only public market data is read, so no API credentials are needed.

use super::provider::{check_range, finish_fetch, DataError, MarketDataSource};
use crate::domain::{Candle, Interval};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

/// Maximum candles per request accepted by the endpoint.
const MAX_LIMIT: usize = 1500;

pub struct BinanceFuturesSource {
    client: reqwest::blocking::Client,
    base_url: String,
    limit: usize,
}

impl BinanceFuturesSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            limit: MAX_LIMIT,
        })
    }

    fn klines_url(&self, symbol: &str, interval: Interval, start_ms: i64, end_ms: i64) -> String {
        format!(
            "{}/fapi/v1/klines?symbol={symbol}&interval={interval}\
             &startTime={start_ms}&endTime={end_ms}&limit={}",
            self.base_url.trim_end_matches('/'),
            self.limit
        )
    }

    fn fetch_page(&self, url: &str) -> Result<Vec<Candle>, DataError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(DataError::ResponseFormatChanged(format!(
                "HTTP {status}: {body}"
            )));
        }

        let rows: Vec<Vec<Value>> = resp
            .json()
            .map_err(|e| DataError::ResponseFormatChanged(e.to_string()))?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }
}

/// Parse one kline row: `[open_time, "open", "high", "low", "close", "volume", close_time, ...]`.
fn parse_kline(row: &[Value]) -> Result<Candle, DataError> {
    if row.len() < 6 {
        return Err(DataError::ResponseFormatChanged(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| DataError::ResponseFormatChanged("open time is not an integer".into()))?;
    let timestamp = DateTime::from_timestamp_millis(open_time)
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("invalid open time: {open_time}")))?;

    let num = |idx: usize| -> Result<f64, DataError> {
        match &row[idx] {
            Value::String(s) => s.parse::<f64>().map_err(|_| {
                DataError::ResponseFormatChanged(format!("field {idx} is not numeric: {s}"))
            }),
            Value::Number(n) => n.as_f64().ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("field {idx} is not numeric"))
            }),
            other => Err(DataError::ResponseFormatChanged(format!(
                "field {idx} has unexpected type: {other}"
            ))),
        }
    };

    Ok(Candle {
        timestamp,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
    })
}

impl MarketDataSource for BinanceFuturesSource {
    fn name(&self) -> &str {
        "binance-futures"
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        check_range(start, end)?;
        let step_ms = interval.minutes() * 60_000;
        let end_ms = end.timestamp_millis();
        let mut cursor = start.timestamp_millis();
        let mut candles = Vec::new();

        while cursor <= end_ms {
            let url = self.klines_url(symbol, interval, cursor, end_ms);
            let page = self.fetch_page(&url)?;
            let Some(last) = page.last() else {
                break;
            };
            let next = last.timestamp.timestamp_millis() + step_ms;
            let page_len = page.len();
            candles.extend(page);
            tracing::debug!(symbol, %interval, fetched = candles.len(), "fetched kline page");

            if page_len < self.limit || next <= cursor {
                break;
            }
            cursor = next;
        }

        finish_fetch(symbol, interval, start, end, candles)
    }
}
