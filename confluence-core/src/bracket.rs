//! Bracket order lifecycle: entry, protective stop and profit target.
//!
//! One bracket at a time. While any order of the current bracket is live the
//! controller ignores new signals; it returns to `Idle` once every tracked
//! order is terminal and the position is flat. Exits belong to the stop and
//! target alone: the controller never closes a position on a signal.

use crate::broker::BrokerSimulator;
use crate::domain::{
    ExitReason, OrderId, OrderNotification, OrderSide, OrderStatus, Position, PositionSide,
    TradeRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stop distance as a fraction of the entry reference price, and the
/// reward-to-risk ratio that places the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BracketParams {
    pub sl_pct: f64,
    pub rr: f64,
}

impl Default for BracketParams {
    fn default() -> Self {
        Self {
            sl_pct: 0.005,
            rr: 1.5,
        }
    }
}

impl BracketParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.sl_pct.is_nan() || self.sl_pct <= 0.0 || self.sl_pct >= 1.0 {
            return Err(format!("sl_pct must be in (0, 1), got {}", self.sl_pct));
        }
        if self.rr.is_nan() || self.rr <= 0.0 {
            return Err(format!("rr must be > 0, got {}", self.rr));
        }
        Ok(())
    }

    /// `(stop, target)` for an entry referenced at `price`.
    pub fn levels(&self, side: PositionSide, price: f64) -> Option<(f64, f64)> {
        match side {
            PositionSide::Long => {
                let stop = price * (1.0 - self.sl_pct);
                Some((stop, price + (price - stop) * self.rr))
            }
            PositionSide::Short => {
                let stop = price * (1.0 + self.sl_pct);
                Some((stop, price - (stop - price) * self.rr))
            }
            PositionSide::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Idle,
    /// Entry sent, not yet filled.
    Submitted,
    /// Entry filled, stop and target live.
    Open,
}

/// Ids of one submitted bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketIds {
    pub entry: OrderId,
    pub stop: OrderId,
    pub target: OrderId,
}

#[derive(Debug, Clone, Copy)]
struct OpenLeg {
    side: PositionSide,
    bar: usize,
    time: Option<DateTime<Utc>>,
    price: f64,
    size: f64,
    commission: f64,
}

#[derive(Debug, Clone)]
pub struct BracketOrderController {
    params: BracketParams,
    state: ControllerState,
    position: Position,
    bracket: Option<BracketIds>,
    statuses: HashMap<OrderId, OrderStatus>,
    open_leg: Option<OpenLeg>,
    trades: Vec<TradeRecord>,
    entries_submitted: usize,
}

impl BracketOrderController {
    pub fn new(params: BracketParams) -> Self {
        Self {
            params,
            state: ControllerState::Idle,
            position: Position::flat(),
            bracket: None,
            statuses: HashMap::new(),
            open_leg: None,
            trades: Vec::new(),
            entries_submitted: 0,
        }
    }

    pub fn params(&self) -> &BracketParams {
        &self.params
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn bracket(&self) -> Option<BracketIds> {
        self.bracket
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    pub fn entries_submitted(&self) -> usize {
        self.entries_submitted
    }

    /// True while any order of the current bracket is non-terminal.
    pub fn has_live_orders(&self) -> bool {
        self.statuses.values().any(|s| s.is_live())
    }

    /// Evaluate one closed bar. Submits a bracket when nothing is outstanding,
    /// the position is flat and `signal` is non-zero.
    pub fn on_bar(
        &mut self,
        bar: usize,
        signal: i8,
        close: f64,
        broker: &mut dyn BrokerSimulator,
    ) -> Option<BracketIds> {
        if self.has_live_orders() || !self.position.is_flat() {
            return None;
        }
        let side = match signal {
            1 => PositionSide::Long,
            -1 => PositionSide::Short,
            _ => return None,
        };
        let (stop, target) = self.params.levels(side, close)?;
        let size = broker.affordable_size(close);
        if !(size.is_finite() && size > 0.0) {
            tracing::warn!(bar, close, cash = broker.cash(), "no affordable size, skipping entry");
            return None;
        }

        let (entry_side, exit_side) = match side {
            PositionSide::Short => (OrderSide::Sell, OrderSide::Buy),
            _ => (OrderSide::Buy, OrderSide::Sell),
        };
        let entry = broker.submit_market_order(entry_side, size);
        let stop_id = broker.submit_stop_order(exit_side, size, stop, Some(entry));
        let target_id = broker.submit_limit_order(exit_side, size, target, Some(entry));

        let ids = BracketIds {
            entry,
            stop: stop_id,
            target: target_id,
        };
        self.statuses.clear();
        for id in [entry, stop_id, target_id] {
            self.statuses.insert(id, OrderStatus::Submitted);
        }
        self.bracket = Some(ids);
        self.state = ControllerState::Submitted;
        self.entries_submitted += 1;
        tracing::debug!(bar, ?side, close, size, stop, target, "bracket submitted");
        Some(ids)
    }

    /// Apply one broker notification. Notifications for orders outside the
    /// current bracket are ignored.
    pub fn on_notification(
        &mut self,
        note: &OrderNotification,
        time: Option<DateTime<Utc>>,
        broker: &mut dyn BrokerSimulator,
    ) {
        let Some(ids) = self.bracket else {
            return;
        };
        if !self.statuses.contains_key(&note.order_id) {
            return;
        }
        self.statuses.insert(note.order_id, note.status);

        if note.order_id == ids.entry {
            match note.status {
                OrderStatus::Completed => self.on_entry_filled(note, time),
                OrderStatus::Canceled | OrderStatus::Margin | OrderStatus::Rejected => {
                    tracing::warn!(order = %note.order_id, status = ?note.status, "entry not filled, abandoning bracket");
                    for child in [ids.stop, ids.target] {
                        broker.cancel(child);
                        self.statuses.insert(child, OrderStatus::Canceled);
                    }
                }
                _ => {}
            }
        } else if note.status == OrderStatus::Completed {
            let reason = if note.order_id == ids.stop {
                ExitReason::StopLoss
            } else {
                ExitReason::TakeProfit
            };
            self.on_exit_filled(note, time, reason);
        }

        self.refresh_state();
    }

    /// Apply every notification a bar produced, in order.
    pub fn on_notifications(
        &mut self,
        notes: &[OrderNotification],
        time: Option<DateTime<Utc>>,
        broker: &mut dyn BrokerSimulator,
    ) {
        for note in notes {
            self.on_notification(note, time, broker);
        }
    }

    fn on_entry_filled(&mut self, note: &OrderNotification, time: Option<DateTime<Utc>>) {
        let price = note.fill_price.unwrap_or(f64::NAN);
        let side = match note.side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };
        self.position = Position {
            side,
            entry_price: price,
            size: note.size,
        };
        self.open_leg = Some(OpenLeg {
            side,
            bar: note.bar_index,
            time,
            price,
            size: note.size,
            commission: note.commission,
        });
    }

    fn on_exit_filled(&mut self, note: &OrderNotification, time: Option<DateTime<Utc>>, reason: ExitReason) {
        self.position = Position::flat();
        let Some(leg) = self.open_leg.take() else {
            return;
        };
        let exit_price = note.fill_price.unwrap_or(f64::NAN);
        let dir = if leg.side == PositionSide::Long { 1.0 } else { -1.0 };
        let gross_pnl = dir * (exit_price - leg.price) * leg.size;
        let commission = leg.commission + note.commission;
        let trade = TradeRecord {
            side: leg.side,
            entry_bar: leg.bar,
            entry_time: leg.time,
            entry_price: leg.price,
            exit_bar: note.bar_index,
            exit_time: time,
            exit_price,
            exit_reason: reason,
            size: leg.size,
            gross_pnl,
            commission,
            net_pnl: gross_pnl - commission,
        };
        tracing::debug!(?reason, net_pnl = trade.net_pnl, "trade closed");
        self.trades.push(trade);
    }

    fn refresh_state(&mut self) {
        self.state = if !self.has_live_orders() && self.position.is_flat() {
            self.bracket = None;
            self.statuses.clear();
            ControllerState::Idle
        } else if self.position.is_flat() {
            ControllerState::Submitted
        } else {
            ControllerState::Open
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerConfig, SimBroker};
    use crate::domain::Candle;
    use chrono::{Duration, TimeZone};

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(5 * i),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn broker() -> SimBroker {
        SimBroker::new(BrokerConfig {
            cash: 10_000.0,
            commission: 0.0,
            leverage: 1.0,
            size_pct: 0.5,
        })
    }

    fn step(ctl: &mut BracketOrderController, b: &mut SimBroker, c: &Candle) {
        let notes = b.process_bar(c);
        ctl.on_notifications(&notes, Some(c.timestamp), b);
    }

    #[test]
    fn levels_mirror_for_short() {
        let p = BracketParams { sl_pct: 0.01, rr: 2.0 };
        let (stop, target) = p.levels(PositionSide::Long, 100.0).unwrap();
        assert!((stop - 99.0).abs() < 1e-9 && (target - 102.0).abs() < 1e-9);
        let (stop, target) = p.levels(PositionSide::Short, 100.0).unwrap();
        assert!((stop - 101.0).abs() < 1e-9 && (target - 98.0).abs() < 1e-9);
        assert!(p.levels(PositionSide::Flat, 100.0).is_none());
    }

    #[test]
    fn long_bracket_runs_to_target_and_returns_idle() {
        let mut b = broker();
        let mut ctl = BracketOrderController::new(BracketParams { sl_pct: 0.01, rr: 2.0 });

        let ids = ctl.on_bar(0, 1, 100.0, &mut b).unwrap();
        assert_eq!(ctl.state(), ControllerState::Submitted);
        // Outstanding bracket blocks a second entry.
        assert!(ctl.on_bar(0, -1, 100.0, &mut b).is_none());

        step(&mut ctl, &mut b, &candle(1, 100.0, 100.5, 99.5, 100.2));
        assert_eq!(ctl.state(), ControllerState::Open);
        assert!(ctl.on_bar(1, 1, 100.2, &mut b).is_none());

        step(&mut ctl, &mut b, &candle(2, 100.5, 102.5, 100.0, 102.0));
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert_eq!(b.order(ids.target).unwrap().status, OrderStatus::Completed);
        assert_eq!(b.order(ids.stop).unwrap().status, OrderStatus::Canceled);

        let trades = ctl.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::TakeProfit);
        assert!((trades[0].exit_price - 102.0).abs() < 1e-9);
        assert!(trades[0].net_pnl > 0.0);
    }

    #[test]
    fn margin_call_returns_to_idle() {
        let mut b = SimBroker::new(BrokerConfig {
            cash: 1_000.0,
            commission: 0.005,
            leverage: 1.0,
            size_pct: 1.0,
        });
        let mut ctl = BracketOrderController::new(BracketParams::default());
        ctl.on_bar(0, 1, 100.0, &mut b).unwrap();
        // Gap up: sized at 100, filled at 110, can't cover.
        step(&mut ctl, &mut b, &candle(1, 110.0, 111.0, 109.0, 110.0));
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert!(ctl.trades().is_empty());
        assert!(ctl.on_bar(1, -1, 110.0, &mut b).is_some());
    }

    #[test]
    fn neutral_signal_does_nothing() {
        let mut b = broker();
        let mut ctl = BracketOrderController::new(BracketParams::default());
        assert!(ctl.on_bar(0, 0, 100.0, &mut b).is_none());
        assert_eq!(ctl.entries_submitted(), 0);
    }

    #[test]
    fn foreign_notifications_are_ignored() {
        let mut b = broker();
        let mut ctl = BracketOrderController::new(BracketParams::default());
        let other = b.submit_market_order(OrderSide::Buy, 1.0);
        ctl.on_bar(0, 1, 100.0, &mut b).unwrap();
        let notes = b.process_bar(&candle(1, 100.0, 100.1, 99.9, 100.0));
        assert!(notes.iter().any(|n| n.order_id == other));
        ctl.on_notifications(&notes, None, &mut b);
        assert_eq!(ctl.position().side, PositionSide::Long);
    }
}
