//! Pairing reward entitlements.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    AgentId, Commission, CommissionStatus, NewCommission, PaymentId, PlanId, RewardId,
    PAIRING_BONUS_LEVEL,
};

/// A locked bonus released once `pairing_completed` reaches `pairing_limit`.
///
/// Terminal once `is_released` is set: no further increments apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReward {
    pub id: RewardId,
    pub agent_id: AgentId,
    pub plan_id: PlanId,
    pub pairing_completed: u32,
    pub pairing_limit: u32,
    pub locked_amount: Decimal,
    pub is_released: bool,
    pub released_at: Option<DateTime<Utc>>,
}

impl PlanReward {
    pub fn new(agent_id: AgentId, plan_id: PlanId, pairing_limit: u32, locked_amount: Decimal) -> Self {
        Self {
            id: RewardId::new(),
            agent_id,
            plan_id,
            pairing_completed: 0,
            pairing_limit,
            locked_amount,
            is_released: false,
            released_at: None,
        }
    }

    pub fn threshold_reached(&self) -> bool {
        self.pairing_completed >= self.pairing_limit
    }

    /// The level-0 bonus paid when this reward is released.
    pub fn payout(&self, from_agent_id: AgentId, payment_id: Option<PaymentId>) -> NewCommission {
        NewCommission {
            agent_id: self.agent_id,
            from_agent_id,
            plan_id: self.plan_id,
            commission_amount: self.locked_amount,
            original_amount: self.locked_amount,
            level: PAIRING_BONUS_LEVEL,
            status: CommissionStatus::Paid,
            payment_id,
        }
    }
}

/// A child placement to credit to the node it landed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingEvent {
    /// The node the new agent was actually placed under.
    pub parent_id: AgentId,
    pub plan_id: PlanId,
    /// The newly placed agent.
    pub from_agent_id: AgentId,
    pub payment_id: Option<PaymentId>,
}

/// State after crediting one pairing to an unreleased reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCredit {
    pub reward: PlanReward,
    /// False when this child was already credited to the reward.
    pub counted: bool,
    /// Set when this credit reached the threshold and released the reward.
    pub payout: Option<Commission>,
}
