//! Does a bar fill a given order, and at what price?
//!
//! Stops fill at the trigger, or at the open if the bar gapped through it.
//! Limits fill at the limit, or at the open if it already traded better.

use crate::domain::{Candle, OrderSide, OrderType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerResult {
    NoTrigger,
    Fill { price: f64, gap_through: bool },
}

impl TriggerResult {
    pub fn is_fill(&self) -> bool {
        matches!(self, TriggerResult::Fill { .. })
    }
}

pub fn check_trigger(side: OrderSide, order_type: OrderType, bar: &Candle) -> TriggerResult {
    if bar.is_void() {
        return TriggerResult::NoTrigger;
    }
    match order_type {
        OrderType::Market => TriggerResult::Fill {
            price: bar.open,
            gap_through: false,
        },
        OrderType::Stop { price } => check_stop(side, price, bar),
        OrderType::Limit { price } => check_limit(side, price, bar),
    }
}

fn check_stop(side: OrderSide, stop: f64, bar: &Candle) -> TriggerResult {
    let (hit, gapped) = match side {
        OrderSide::Sell => (bar.low <= stop, bar.open <= stop),
        OrderSide::Buy => (bar.high >= stop, bar.open >= stop),
    };
    if !hit {
        return TriggerResult::NoTrigger;
    }
    TriggerResult::Fill {
        price: if gapped { bar.open } else { stop },
        gap_through: gapped,
    }
}

fn check_limit(side: OrderSide, limit: f64, bar: &Candle) -> TriggerResult {
    let (hit, better_open) = match side {
        OrderSide::Sell => (bar.high >= limit, bar.open >= limit),
        OrderSide::Buy => (bar.low <= limit, bar.open <= limit),
    };
    if !hit {
        return TriggerResult::NoTrigger;
    }
    TriggerResult::Fill {
        price: if better_open { bar.open } else { limit },
        gap_through: better_open,
    }
}
