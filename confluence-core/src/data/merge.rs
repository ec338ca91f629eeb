//! Multi-timeframe merge.
//!
//! Aligns one candle series per interval onto the timestamps of the shortest
//! (base) interval. Non-base series are left-joined on exact timestamps and
//! forward-filled, so a 1h candle keyed at 10:00 shows up on every 5m row
//! from 10:00 until the next 1h candle. Rows before the first non-base match
//! stay void for that interval.

use super::provider::{DataError, MarketDataSource};
use crate::domain::{Candle, Interval};
use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Base-interval frame with per-interval columns and the derived pipeline columns.
///
/// Invariant: one row per base timestamp, strictly increasing, no duplicates.
/// Every column has the same length as `timestamps`. The derived columns
/// (`signals`, `score`, `probability`, `trade_signal`) are empty until the
/// decision engine fills them.
#[derive(Debug, Clone)]
pub struct MergedFrame {
    pub symbol: String,
    pub base: Interval,
    /// Intervals in ascending duration; `intervals[0] == base`.
    pub intervals: Vec<Interval>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub candles: BTreeMap<Interval, Vec<Candle>>,
    pub signals: BTreeMap<Interval, Vec<i8>>,
    pub score: Vec<f64>,
    pub probability: Vec<f64>,
    pub trade_signal: Vec<i8>,
}

/// Read-only view of one merged row.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub timestamp: DateTime<Utc>,
    pub candles: Vec<(Interval, Candle)>,
    pub signals: Vec<(Interval, i8)>,
    pub score: Option<f64>,
    pub probability: Option<f64>,
    pub trade_signal: Option<i8>,
}

impl MergedFrame {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Candles of one interval, aligned to the base grid.
    pub fn column(&self, interval: Interval) -> Option<&[Candle]> {
        self.candles.get(&interval).map(|c| c.as_slice())
    }

    /// The base interval's own candles (never void).
    pub fn base_candles(&self) -> &[Candle] {
        self.candles
            .get(&self.base)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_row_complete(&self, index: usize) -> bool {
        self.candles.values().all(|col| !col[index].is_void())
    }

    /// Number of leading rows with at least one unresolved column.
    pub fn incomplete_prefix_len(&self) -> usize {
        (0..self.len())
            .find(|&i| self.is_row_complete(i))
            .unwrap_or(self.len())
    }

    /// Drop the leading rows that still have unresolved forward-fill gaps.
    ///
    /// Returns how many rows were removed. Must run before derived columns
    /// are attached.
    pub fn drop_incomplete_prefix(&mut self) -> usize {
        let n = self.incomplete_prefix_len();
        if n == 0 {
            return 0;
        }
        self.timestamps.drain(..n);
        for col in self.candles.values_mut() {
            col.drain(..n);
        }
        for col in self.signals.values_mut() {
            col.drain(..n.min(col.len()));
        }
        for col in [&mut self.score, &mut self.probability] {
            col.drain(..n.min(col.len()));
        }
        let ts_len = n.min(self.trade_signal.len());
        self.trade_signal.drain(..ts_len);
        n
    }

    pub fn row(&self, index: usize) -> Option<MergedRow> {
        let timestamp = *self.timestamps.get(index)?;
        Some(MergedRow {
            timestamp,
            candles: self
                .intervals
                .iter()
                .map(|iv| (*iv, self.candles[iv][index]))
                .collect(),
            signals: self
                .signals
                .iter()
                .filter_map(|(iv, col)| col.get(index).map(|s| (*iv, *s)))
                .collect(),
            score: self.score.get(index).copied(),
            probability: self.probability.get(index).copied(),
            trade_signal: self.trade_signal.get(index).copied(),
        })
    }
}

/// Fetch every interval from `source` and merge onto the base grid.
pub fn merge(
    source: &dyn MarketDataSource,
    symbol: &str,
    intervals: &[Interval],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<MergedFrame, PipelineError> {
    let mut series = BTreeMap::new();
    for &interval in intervals {
        let candles = match source.fetch(symbol, interval, start, end) {
            Ok(c) => c,
            Err(DataError::Unavailable { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(symbol, %interval, candles = candles.len(), source = source.name(), "fetched series");
        series.insert(interval, candles);
    }
    merge_series(symbol, series)
}

/// Merge already-fetched series onto the base (shortest) interval.
pub fn merge_series(
    symbol: &str,
    series: BTreeMap<Interval, Vec<Candle>>,
) -> Result<MergedFrame, PipelineError> {
    if series.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one interval is required".into(),
        ));
    }

    let mut cleaned: BTreeMap<Interval, Vec<Candle>> = BTreeMap::new();
    for (interval, mut candles) in series {
        if candles.is_empty() {
            return Err(PipelineError::DataUnavailable {
                symbol: symbol.to_string(),
                interval,
            });
        }
        candles.sort_by_key(|c| c.timestamp);
        candles.reverse();
        candles.dedup_by_key(|c| c.timestamp);
        candles.reverse();
        cleaned.insert(interval, candles);
    }

    // BTreeMap orders by duration, so the first key is the base interval.
    let intervals: Vec<Interval> = cleaned.keys().copied().collect();
    let base = intervals[0];
    let base_candles = cleaned.remove(&base).unwrap_or_default();
    let timestamps: Vec<DateTime<Utc>> = base_candles.iter().map(|c| c.timestamp).collect();
    let base_set: HashSet<DateTime<Utc>> = timestamps.iter().copied().collect();

    let mut candles = BTreeMap::new();
    for (interval, other) in cleaned {
        if !other.iter().any(|c| base_set.contains(&c.timestamp)) {
            return Err(PipelineError::MisalignedData {
                base,
                other: interval,
            });
        }

        let by_ts: HashMap<DateTime<Utc>, Candle> =
            other.iter().map(|c| (c.timestamp, *c)).collect();
        let mut last: Option<Candle> = None;
        let column: Vec<Candle> = timestamps
            .iter()
            .map(|ts| {
                if let Some(c) = by_ts.get(ts) {
                    last = Some(*c);
                }
                last.unwrap_or_else(|| Candle::void(*ts))
            })
            .collect();
        candles.insert(interval, column);
    }
    candles.insert(base, base_candles);

    Ok(MergedFrame {
        symbol: symbol.to_string(),
        base,
        intervals,
        timestamps,
        candles,
        signals: BTreeMap::new(),
        score: Vec::new(),
        probability: Vec::new(),
        trade_signal: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn series(step_minutes: i64, count: usize, offset_minutes: i64, base_price: f64) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let close = base_price + i as f64;
                Candle {
                    timestamp: t0() + Duration::minutes(offset_minutes + step_minutes * i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1.0,
                }
            })
            .collect()
    }

    #[test]
    fn base_is_shortest_interval_and_ffill_holds_last_value() {
        let mut input = BTreeMap::new();
        input.insert(Interval::H1, series(60, 3, 0, 1000.0));
        input.insert(Interval::M15, series(15, 12, 0, 100.0));

        let frame = merge_series("BTCUSDT", input).unwrap();
        assert_eq!(frame.base, Interval::M15);
        assert_eq!(frame.len(), 12);

        let h1 = frame.column(Interval::H1).unwrap();
        assert_eq!(h1[0].close, 1000.0);
        assert_eq!(h1[3].close, 1000.0);
        assert_eq!(h1[4].close, 1001.0);
        assert_eq!(h1[11].close, 1002.0);
    }

    #[test]
    fn leading_gap_is_void_and_droppable() {
        let mut input = BTreeMap::new();
        input.insert(Interval::M5, series(5, 24, 0, 100.0));
        // First hourly candle keyed at 01:00.
        input.insert(Interval::H1, series(60, 1, 60, 500.0));

        let mut frame = merge_series("BTCUSDT", input).unwrap();
        assert_eq!(frame.incomplete_prefix_len(), 12);
        assert!(frame.column(Interval::H1).unwrap()[11].is_void());

        let dropped = frame.drop_incomplete_prefix();
        assert_eq!(dropped, 12);
        assert_eq!(frame.len(), 12);
        assert_eq!(frame.timestamps[0], t0() + Duration::minutes(60));
        assert!((0..frame.len()).all(|i| frame.is_row_complete(i)));
    }

    #[test]
    fn empty_series_is_data_unavailable() {
        let mut input = BTreeMap::new();
        input.insert(Interval::M5, series(5, 10, 0, 100.0));
        input.insert(Interval::H1, Vec::new());

        let err = merge_series("BTCUSDT", input).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DataUnavailable { interval: Interval::H1, .. }
        ));
    }

    #[test]
    fn disjoint_timestamps_are_misaligned() {
        let mut input = BTreeMap::new();
        input.insert(Interval::M5, series(5, 10, 0, 100.0));
        // Hourly candles keyed at :07, never on the 5m grid.
        input.insert(Interval::H1, series(60, 3, 7, 100.0));

        let err = merge_series("BTCUSDT", input).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MisalignedData {
                base: Interval::M5,
                other: Interval::H1
            }
        ));
    }

    #[test]
    fn duplicate_base_timestamps_collapse() {
        let mut base = series(5, 4, 0, 100.0);
        let mut dup = base[2];
        dup.close = 999.0;
        base.push(dup);

        let mut input = BTreeMap::new();
        input.insert(Interval::M5, base);
        let frame = merge_series("BTCUSDT", input).unwrap();

        assert_eq!(frame.len(), 4);
        assert_eq!(frame.base_candles()[2].close, 999.0);
        assert!(frame.timestamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn row_view_exposes_all_intervals() {
        let mut input = BTreeMap::new();
        input.insert(Interval::M15, series(15, 4, 0, 100.0));
        input.insert(Interval::H1, series(60, 1, 0, 1000.0));
        let frame = merge_series("BTCUSDT", input).unwrap();

        let row = frame.row(2).unwrap();
        assert_eq!(row.candles.len(), 2);
        assert_eq!(row.candles[0].0, Interval::M15);
        assert_eq!(row.candles[1].1.close, 1000.0);
        assert!(row.score.is_none());
        assert!(frame.row(4).is_none());
    }
}
