//! Bar loop: broker notifications first, then one decision per bar close.

use crate::bracket::{BracketOrderController, BracketParams};
use crate::broker::BrokerSimulator;
use crate::domain::{Candle, TradeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutcome {
    pub initial_cash: f64,
    pub final_value: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub entries_submitted: usize,
}

impl BacktestOutcome {
    pub fn total_return(&self) -> f64 {
        if self.initial_cash == 0.0 {
            return 0.0;
        }
        self.final_value / self.initial_cash - 1.0
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        self.trades.iter().filter(|t| t.is_winner()).count() as f64 / self.trades.len() as f64
    }

    /// Largest peak-to-trough equity decline, as a positive fraction.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = self.initial_cash;
        let mut worst = 0.0f64;
        for p in &self.equity_curve {
            peak = peak.max(p.equity);
            if peak > 0.0 {
                worst = worst.max((peak - p.equity) / peak);
            }
        }
        worst
    }
}

/// Replay `candles` with one trade signal per bar.
///
/// On each bar the broker fills against it, the controller absorbs the
/// resulting notifications, equity is marked at the close, and only then is
/// the bar's signal evaluated. Orders placed at bar `i` therefore fill from
/// bar `i + 1`. Missing signals count as 0.
pub fn run_backtest<B: BrokerSimulator>(
    candles: &[Candle],
    signals: &[i8],
    params: BracketParams,
    mut broker: B,
) -> BacktestOutcome {
    let initial_cash = broker.cash();
    let mut controller = BracketOrderController::new(params);
    let mut equity_curve = Vec::with_capacity(candles.len());

    for (i, candle) in candles.iter().enumerate() {
        let notes = broker.process_bar(candle);
        controller.on_notifications(&notes, Some(candle.timestamp), &mut broker);
        equity_curve.push(EquityPoint {
            timestamp: candle.timestamp,
            equity: broker.equity(),
        });

        if candle.is_void() {
            continue;
        }
        let signal = signals.get(i).copied().unwrap_or(0);
        controller.on_bar(i, signal, candle.close, &mut broker);
    }

    BacktestOutcome {
        initial_cash,
        final_value: broker.equity(),
        equity_curve,
        entries_submitted: controller.entries_submitted(),
        trades: controller.into_trades(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerConfig, SimBroker};
    use crate::domain::ExitReason;
    use chrono::{Duration, TimeZone};

    fn candles(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ohlc.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: t0 + Duration::minutes(5 * i as i64),
                open,
                high,
                low,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn frictionless() -> SimBroker {
        SimBroker::new(BrokerConfig {
            cash: 10_000.0,
            commission: 0.0,
            leverage: 1.0,
            size_pct: 1.0,
        })
    }

    #[test]
    fn no_signals_keeps_cash() {
        let bars = candles(&[(100.0, 101.0, 99.0, 100.0); 5]);
        let out = run_backtest(&bars, &[0; 5], BracketParams::default(), frictionless());
        assert_eq!(out.final_value, 10_000.0);
        assert!(out.trades.is_empty());
        assert_eq!(out.equity_curve.len(), 5);
        assert_eq!(out.total_return(), 0.0);
    }

    #[test]
    fn long_signal_hits_stop_on_later_bar() {
        // Signal at bar 0 (close 100): stop 99, target 102 with sl 1%, rr 2.
        let bars = candles(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.4, 99.6, 100.0), // entry fills at open 100
            (100.0, 100.2, 98.5, 98.8),  // stop at 99
            (98.8, 99.0, 98.0, 98.5),
        ]);
        let params = BracketParams { sl_pct: 0.01, rr: 2.0 };
        let out = run_backtest(&bars, &[1, 1, 1, 0], params, frictionless());

        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
        assert_eq!(t.entry_bar, 1);
        assert_eq!(t.exit_bar, 2);
        assert!((t.exit_price - 99.0).abs() < 1e-9);
        // Re-entry on bar 2's signal fills at bar 3 open.
        assert_eq!(out.entries_submitted, 2);
        assert!(out.max_drawdown() > 0.0);
        assert!(out.final_value < 10_000.0);
    }

    #[test]
    fn drawdown_and_win_rate_on_empty_run() {
        let out = run_backtest(&[], &[], BracketParams::default(), frictionless());
        assert_eq!(out.win_rate(), 0.0);
        assert_eq!(out.max_drawdown(), 0.0);
        assert_eq!(out.final_value, 10_000.0);
    }
}
