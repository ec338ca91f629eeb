//! Broker simulation: order table, bracket activation, OCO, costs and margin.

pub mod cost_model;
pub mod sim;
pub mod trigger;

pub use cost_model::CostModel;
pub use sim::SimBroker;

use crate::domain::{Candle, Order, OrderId, OrderNotification, OrderSide, Position};
use serde::{Deserialize, Serialize};

/// Account and friction settings for a simulated broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub cash: f64,
    /// Fraction of notional charged per fill.
    pub commission: f64,
    pub leverage: f64,
    /// Share of cash committed as margin on each entry.
    pub size_pct: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            cash: 100_000.0,
            commission: 0.005,
            leverage: 10.0,
            size_pct: 0.95,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.cash.is_finite() && self.cash > 0.0) {
            return Err(format!("cash must be positive, got {}", self.cash));
        }
        if !(0.0..1.0).contains(&self.commission) {
            return Err(format!("commission must be in [0, 1), got {}", self.commission));
        }
        if self.leverage.is_nan() || self.leverage < 1.0 {
            return Err(format!("leverage must be >= 1, got {}", self.leverage));
        }
        if self.size_pct.is_nan() || self.size_pct <= 0.0 || self.size_pct > 1.0 {
            return Err(format!("size_pct must be in (0, 1], got {}", self.size_pct));
        }
        Ok(())
    }
}

/// Executes orders bar by bar and reports status changes.
///
/// Orders submitted between bars are evaluated against the next bar passed to
/// `process_bar`. Passing a `parent` makes a stop/limit a bracket child: it
/// stays dormant until the parent completes, and children of the same parent
/// form an OCO pair.
pub trait BrokerSimulator: Send {
    fn submit_market_order(&mut self, side: OrderSide, size: f64) -> OrderId;

    fn submit_stop_order(
        &mut self,
        side: OrderSide,
        size: f64,
        price: f64,
        parent: Option<OrderId>,
    ) -> OrderId;

    fn submit_limit_order(
        &mut self,
        side: OrderSide,
        size: f64,
        price: f64,
        parent: Option<OrderId>,
    ) -> OrderId;

    /// Cancel a live order. Returns false if it was already terminal or unknown.
    fn cancel(&mut self, id: OrderId) -> bool;

    /// Advance one bar and return every status change, in the order it happened.
    fn process_bar(&mut self, candle: &Candle) -> Vec<OrderNotification>;

    fn order(&self, id: OrderId) -> Option<&Order>;

    /// Largest entry size the margin model admits at `price`.
    fn affordable_size(&self, price: f64) -> f64;

    fn cash(&self) -> f64;

    fn equity(&self) -> f64;

    fn position(&self) -> Position;

    fn commission_pct(&self) -> f64;

    fn leverage(&self) -> f64;
}
