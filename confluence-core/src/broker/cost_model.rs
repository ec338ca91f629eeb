//! Commission and margin arithmetic.

/// Percentage commission on notional, plus leverage for margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub commission_pct: f64,
    pub leverage: f64,
}

impl CostModel {
    pub fn new(commission_pct: f64, leverage: f64) -> Self {
        Self {
            commission_pct,
            leverage,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 1.0)
    }

    pub fn commission(&self, price: f64, size: f64) -> f64 {
        (price * size).abs() * self.commission_pct
    }

    /// Cash needed to open `size` at `price`: initial margin plus the opening fee.
    pub fn required_cash(&self, price: f64, size: f64) -> f64 {
        (price * size).abs() / self.leverage + self.commission(price, size)
    }

    /// Size whose `required_cash` equals `budget` at `price`.
    pub fn size_for_budget(&self, budget: f64, price: f64) -> f64 {
        if price <= 0.0 || budget <= 0.0 || !price.is_finite() {
            return 0.0;
        }
        let notional = budget / (1.0 / self.leverage + self.commission_pct);
        notional / price
    }
}
