//! Order types, order status, and broker notifications.
//!
//! Orders live in an order table keyed by `OrderId`. Bracket children point
//! at their entry through `parent_id` and at each other through a shared
//! `oco_group_id`; there are no object references between orders.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID, allocated sequentially by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One-cancels-other group ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OcoGroupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// What kind of order and its price parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill at the next bar's open.
    Market,
    /// Triggers when price reaches `price`, then fills as market.
    Stop { price: f64 },
    /// Fill at `price` or better.
    Limit { price: f64 },
}

impl OrderType {
    /// Price parameter; `None` for market orders.
    pub fn price(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Stop { price } | OrderType::Limit { price } => Some(*price),
        }
    }
}

/// Order lifecycle states, as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    Accepted,
    Completed,
    Canceled,
    /// Not enough cash to cover margin and commission.
    Margin,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Canceled | OrderStatus::Margin | OrderStatus::Rejected
        )
    }

    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

/// A single order in the broker's order table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: f64,
    pub status: OrderStatus,
    pub created_bar: usize,
    /// Entry order of a bracket, for stop/target children.
    pub parent_id: Option<OrderId>,
    /// OCO group shared by the two bracket children.
    pub oco_group_id: Option<OcoGroupId>,
    /// First bar on which a bracket child may fill.
    /// Children activated during bar T get T+1.
    pub activated_bar: Option<usize>,
    pub fill_price: Option<f64>,
}

impl Order {
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// Status change pushed from the broker to the strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub order_id: OrderId,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub size: f64,
    pub bar_index: usize,
    /// Execution price, set for `Completed`.
    pub fill_price: Option<f64>,
    pub commission: f64,
}

impl OrderNotification {
    pub fn for_order(order: &Order, bar_index: usize) -> Self {
        Self {
            order_id: order.id,
            side: order.side,
            status: order.status,
            size: order.size,
            bar_index,
            fill_price: order.fill_price,
            commission: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::Accepted.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Margin.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
    }

    #[test]
    fn order_type_price() {
        assert_eq!(OrderType::Market.price(), None);
        assert_eq!(OrderType::Stop { price: 95.0 }.price(), Some(95.0));
        assert_eq!(OrderType::Limit { price: 105.0 }.price(), Some(105.0));
    }

    #[test]
    fn side_opposite_and_sign() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
    }
}
