use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

/// Position tracking. Created on entry fill, destroyed on stop or target fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub entry_price: f64,
    pub size: f64,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: PositionSide::Flat,
            entry_price: 0.0,
            size: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.size
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        match self.side {
            PositionSide::Flat => 0.0,
            PositionSide::Long => self.size * (current_price - self.entry_price),
            PositionSide::Short => self.size * (self.entry_price - current_price),
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}
