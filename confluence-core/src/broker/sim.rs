//! Single-symbol simulated broker.
//!
//! Per bar, in order:
//! 1. accepted market orders fill at the open,
//! 2. eligible stop/limit orders fill on intrabar triggers, stops first so a
//!    bar that touches both bracket legs books the loss,
//! 3. the close becomes the mark price for equity.
//!
//! Cash moves only by realized PnL and commission. Margin is checked, not
//! reserved: opening exposure needs `notional / leverage + fee` of free cash.

use super::cost_model::CostModel;
use super::trigger::{check_trigger, TriggerResult};
use super::{BrokerConfig, BrokerSimulator};
use crate::domain::{
    Candle, OcoGroupId, Order, OrderId, OrderNotification, OrderSide, OrderStatus, OrderType,
    Position, PositionSide,
};
use std::collections::BTreeMap;

const SIZE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct SimBroker {
    config: BrokerConfig,
    costs: CostModel,
    cash: f64,
    position: Position,
    orders: BTreeMap<OrderId, Order>,
    next_id: u64,
    /// Index of the next bar `process_bar` will see.
    bar_index: usize,
    mark_price: Option<f64>,
    /// Notifications raised between bars, delivered with the next bar.
    pending: Vec<OrderNotification>,
}

impl SimBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            costs: CostModel::new(config.commission, config.leverage),
            cash: config.cash,
            config,
            position: Position::flat(),
            orders: BTreeMap::new(),
            next_id: 1,
            bar_index: 0,
            mark_price: None,
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn bars_processed(&self) -> usize {
        self.bar_index
    }

    fn submit(
        &mut self,
        side: OrderSide,
        order_type: OrderType,
        size: f64,
        parent: Option<OrderId>,
    ) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;

        let mut order = Order {
            id,
            side,
            order_type,
            size,
            status: OrderStatus::Submitted,
            created_bar: self.bar_index,
            parent_id: parent,
            oco_group_id: parent.map(|p| OcoGroupId(p.0)),
            activated_bar: None,
            fill_price: None,
        };
        self.pending
            .push(OrderNotification::for_order(&order, self.bar_index));

        let price_ok = order_type.price().map_or(true, |p| p.is_finite() && p > 0.0);
        let parent_status = parent.map(|p| self.orders.get(&p).map(|o| o.status));

        let next_status = if !(size.is_finite() && size > 0.0) || !price_ok {
            tracing::warn!(order = %id, size, ?order_type, "order rejected: invalid size or price");
            Some(OrderStatus::Rejected)
        } else {
            match parent_status {
                None => Some(OrderStatus::Accepted),
                Some(None) => {
                    tracing::warn!(order = %id, "order rejected: unknown parent");
                    Some(OrderStatus::Rejected)
                }
                Some(Some(OrderStatus::Completed)) => {
                    order.activated_bar = Some(self.bar_index);
                    Some(OrderStatus::Accepted)
                }
                Some(Some(s)) if s.is_terminal() => Some(OrderStatus::Canceled),
                // Parent still live: stay dormant.
                Some(Some(_)) => None,
            }
        };

        if let Some(status) = next_status {
            order.status = status;
            self.pending
                .push(OrderNotification::for_order(&order, self.bar_index));
        }
        self.orders.insert(id, order);
        id
    }

    fn set_status(&mut self, id: OrderId, status: OrderStatus, bar: usize, out: &mut Vec<OrderNotification>) {
        if let Some(order) = self.orders.get_mut(&id) {
            order.status = status;
            tracing::debug!(order = %id, ?status, bar, "order status");
            out.push(OrderNotification::for_order(order, bar));
        }
    }

    fn children_of(&self, parent: OrderId) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| o.parent_id == Some(parent))
            .map(|o| o.id)
            .collect()
    }

    fn cancel_children(&mut self, parent: OrderId, bar: usize, out: &mut Vec<OrderNotification>) {
        for child in self.children_of(parent) {
            if self.orders.get(&child).is_some_and(|o| o.is_live()) {
                self.set_status(child, OrderStatus::Canceled, bar, out);
            }
        }
    }

    /// Signed exposure, positive long.
    fn signed_size(&self) -> f64 {
        match self.position.side {
            PositionSide::Flat => 0.0,
            PositionSide::Long => self.position.size,
            PositionSide::Short => -self.position.size,
        }
    }

    /// Fill `id` at `price`, enforcing margin on any new exposure.
    fn fill(&mut self, id: OrderId, price: f64, bar: usize, out: &mut Vec<OrderNotification>) {
        let Some(order) = self.orders.get(&id) else {
            return;
        };
        let (side, size) = (order.side, order.size);

        let current = self.signed_size();
        let delta = side.sign() * size;
        let closing = if current * delta < 0.0 {
            size.min(current.abs())
        } else {
            0.0
        };
        let opening = size - closing;
        let commission = self.costs.commission(price, size);

        if opening > SIZE_EPSILON {
            let realized = closing * (price - self.position.entry_price) * current.signum();
            let kept_margin = if closing > 0.0 {
                0.0
            } else {
                self.position.notional() / self.costs.leverage
            };
            let free_cash = self.cash + realized - kept_margin;
            let required = self.costs.required_cash(price, opening) + self.costs.commission(price, closing);
            // Relative slack absorbs rounding when sizing spent the whole budget.
            if required - free_cash > 1e-9 * free_cash.abs().max(1.0) {
                tracing::warn!(order = %id, required, free_cash, "margin call: entry not filled");
                self.set_status(id, OrderStatus::Margin, bar, out);
                self.cancel_children(id, bar, out);
                return;
            }
        }

        self.apply_fill(side, size, price);
        self.cash -= commission;

        if let Some(order) = self.orders.get_mut(&id) {
            order.status = OrderStatus::Completed;
            order.fill_price = Some(price);
            tracing::debug!(order = %id, ?side, size, price, commission, bar, "order filled");
            let mut note = OrderNotification::for_order(order, bar);
            note.commission = commission;
            out.push(note);
        }

        if let Some(group) = self.orders.get(&id).and_then(|o| o.oco_group_id) {
            let siblings: Vec<OrderId> = self
                .orders
                .values()
                .filter(|o| o.id != id && o.oco_group_id == Some(group) && o.is_live())
                .map(|o| o.id)
                .collect();
            for sibling in siblings {
                self.set_status(sibling, OrderStatus::Canceled, bar, out);
            }
        }

        for child in self.children_of(id) {
            if self.orders.get(&child).map(|o| o.status) == Some(OrderStatus::Submitted) {
                if let Some(o) = self.orders.get_mut(&child) {
                    o.activated_bar = Some(bar + 1);
                }
                self.set_status(child, OrderStatus::Accepted, bar, out);
            }
        }
    }

    fn apply_fill(&mut self, side: OrderSide, size: f64, price: f64) {
        let current = self.signed_size();
        let delta = side.sign() * size;

        if current == 0.0 || current.signum() == delta.signum() {
            let total = current.abs() + size;
            let entry = (self.position.entry_price * current.abs() + price * size) / total;
            self.position = Position {
                side: if delta > 0.0 { PositionSide::Long } else { PositionSide::Short },
                entry_price: entry,
                size: total,
            };
            return;
        }

        let closed = size.min(current.abs());
        self.cash += closed * (price - self.position.entry_price) * current.signum();
        let remaining = current.abs() - closed;
        let opened = size - closed;
        if remaining > SIZE_EPSILON {
            self.position.size = remaining;
        } else if opened > SIZE_EPSILON {
            self.position = Position {
                side: if delta > 0.0 { PositionSide::Long } else { PositionSide::Short },
                entry_price: price,
                size: opened,
            };
        } else {
            self.position = Position::flat();
        }
    }

    fn is_eligible(order: &Order, bar: usize) -> bool {
        order.status == OrderStatus::Accepted && order.activated_bar.map_or(true, |first| bar >= first)
    }
}

impl BrokerSimulator for SimBroker {
    fn submit_market_order(&mut self, side: OrderSide, size: f64) -> OrderId {
        self.submit(side, OrderType::Market, size, None)
    }

    fn submit_stop_order(&mut self, side: OrderSide, size: f64, price: f64, parent: Option<OrderId>) -> OrderId {
        self.submit(side, OrderType::Stop { price }, size, parent)
    }

    fn submit_limit_order(&mut self, side: OrderSide, size: f64, price: f64, parent: Option<OrderId>) -> OrderId {
        self.submit(side, OrderType::Limit { price }, size, parent)
    }

    fn cancel(&mut self, id: OrderId) -> bool {
        if !self.orders.get(&id).is_some_and(|o| o.is_live()) {
            return false;
        }
        let bar = self.bar_index;
        let mut out = std::mem::take(&mut self.pending);
        self.set_status(id, OrderStatus::Canceled, bar, &mut out);
        self.cancel_children(id, bar, &mut out);
        self.pending = out;
        true
    }

    fn process_bar(&mut self, candle: &Candle) -> Vec<OrderNotification> {
        let bar = self.bar_index;
        self.bar_index += 1;
        let mut out = std::mem::take(&mut self.pending);

        if candle.is_void() {
            return out;
        }

        let market: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Accepted && o.order_type == OrderType::Market)
            .map(|o| o.id)
            .collect();
        for id in market {
            self.fill(id, candle.open, bar, &mut out);
        }

        let mut triggered: Vec<(bool, OrderId, f64)> = self
            .orders
            .values()
            .filter(|o| o.order_type != OrderType::Market && Self::is_eligible(o, bar))
            .filter_map(|o| match check_trigger(o.side, o.order_type, candle) {
                TriggerResult::Fill { price, .. } => {
                    Some((matches!(o.order_type, OrderType::Limit { .. }), o.id, price))
                }
                TriggerResult::NoTrigger => None,
            })
            .collect();
        // Stops before limits, then submission order.
        triggered.sort_by_key(|&(is_limit, id, _)| (is_limit, id));
        for (_, id, price) in triggered {
            if self.orders.get(&id).is_some_and(|o| o.status == OrderStatus::Accepted) {
                self.fill(id, price, bar, &mut out);
            }
        }

        self.mark_price = Some(candle.close);
        out
    }

    fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    fn affordable_size(&self, price: f64) -> f64 {
        self.costs
            .size_for_budget(self.cash * self.config.size_pct, price)
    }

    fn cash(&self) -> f64 {
        self.cash
    }

    fn equity(&self) -> f64 {
        let mark = self.mark_price.unwrap_or(self.position.entry_price);
        self.cash + self.position.unrealized_pnl(mark)
    }

    fn position(&self) -> Position {
        self.position
    }

    fn commission_pct(&self) -> f64 {
        self.costs.commission_pct
    }

    fn leverage(&self) -> f64 {
        self.costs.leverage
    }
}
