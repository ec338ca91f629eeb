//! Closed round-trip trade.

use super::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// One bracket from entry fill to exit fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: PositionSide,

    pub entry_bar: usize,
    pub entry_time: Option<DateTime<Utc>>,
    pub entry_price: f64,

    pub exit_bar: usize,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    pub size: f64,
    pub gross_pnl: f64,
    /// Entry plus exit commission.
    pub commission: f64,
    pub net_pnl: f64,
}

impl TradeRecord {
    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.size;
        if notional == 0.0 {
            0.0
        } else {
            self.gross_pnl / notional
        }
    }
}
