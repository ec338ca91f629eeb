//! Domain types for Confluence

pub mod candle;
pub mod interval;
pub mod order;
pub mod position;
pub mod trade;

pub use candle::Candle;
pub use interval::{Interval, IntervalParseError};
pub use order::{
    OcoGroupId, Order, OrderId, OrderNotification, OrderSide, OrderStatus, OrderType,
};
pub use position::{Position, PositionSide};
pub use trade::{ExitReason, TradeRecord};

/// Symbol type alias
pub type Symbol = String;
