//! Waterfall distribution arithmetic.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;

/// Decimal places commissions are rounded to.
pub const MONEY_SCALE: u32 = 2;

/// Rounding applied to each level's share.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Midpoints round away from zero (0.005 -> 0.01).
    #[default]
    HalfUp,
    /// Midpoints round to the even neighbour (0.005 -> 0.00).
    HalfEven,
}

impl Rounding {
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            Rounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Rounding::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }

    pub fn round(self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(MONEY_SCALE, self.strategy())
    }
}

/// Split `amount` across `levels` successive levels, each taking
/// `percentage` of what the previous levels left.
///
/// Every share is rounded before it is deducted, so rounding error carries
/// into the remainder seen by the next level.
pub fn waterfall(amount: Decimal, percentage: Decimal, levels: usize, rounding: Rounding) -> Vec<Decimal> {
    let rate = percentage / Decimal::ONE_HUNDRED;
    let mut remaining = amount;
    let mut shares = Vec::with_capacity(levels);
    for _ in 0..levels {
        let share = rounding.round(remaining * rate);
        remaining -= share;
        shares.push(share);
    }
    shares
}
