//! Plans and their chain configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PlanId;

/// A purchasable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub price: Decimal,
    /// Bonus locked per buyer and released once their pairing completes.
    /// `None` means buying the plan establishes no pairing entitlement.
    pub pairing_bonus: Option<Decimal>,
}

impl Plan {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: PlanId::new(),
            name: name.into(),
            price,
            pairing_bonus: None,
        }
    }

    pub fn with_pairing_bonus(mut self, bonus: Decimal) -> Self {
        self.pairing_bonus = Some(bonus);
        self
    }
}

/// Tree and chain configuration attached to a plan.
///
/// `pairing_limit` selects the tree partition and is the branching factor;
/// `max_depth` bounds both tree depth and the sponsor-chain walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSettings {
    pub pairing_limit: u32,
    pub max_depth: u32,
}

impl ChainSettings {
    pub fn new(pairing_limit: u32, max_depth: u32) -> Self {
        Self {
            pairing_limit,
            max_depth,
        }
    }
}
