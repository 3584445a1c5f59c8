//! Commission ledger entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AgentId, CommissionId, PaymentId, PlanId};

/// Level tag used for tree pairing bonuses. Sponsor-chain levels start at 1.
pub const PAIRING_BONUS_LEVEL: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Paid,
    Pending,
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommissionStatus::Paid => f.write_str("paid"),
            CommissionStatus::Pending => f.write_str("pending"),
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(CommissionStatus::Paid),
            "pending" => Ok(CommissionStatus::Pending),
            other => Err(format!("Invalid commission status: {other}")),
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    /// Earner.
    pub agent_id: AgentId,
    /// Purchaser whose activity generated the commission.
    pub from_agent_id: AgentId,
    pub plan_id: PlanId,
    pub commission_amount: Decimal,
    pub original_amount: Decimal,
    pub level: u32,
    pub status: CommissionStatus,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    pub fn is_pairing_bonus(&self) -> bool {
        self.level == PAIRING_BONUS_LEVEL
    }
}

/// Commission fields supplied by an engine; the ledger assigns id and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommission {
    pub agent_id: AgentId,
    pub from_agent_id: AgentId,
    pub plan_id: PlanId,
    pub commission_amount: Decimal,
    pub original_amount: Decimal,
    pub level: u32,
    pub status: CommissionStatus,
    pub payment_id: Option<PaymentId>,
}

impl NewCommission {
    pub fn into_commission(self, created_at: DateTime<Utc>) -> Commission {
        Commission {
            id: CommissionId::new(),
            agent_id: self.agent_id,
            from_agent_id: self.from_agent_id,
            plan_id: self.plan_id,
            commission_amount: self.commission_amount,
            original_amount: self.original_amount,
            level: self.level,
            status: self.status,
            payment_id: self.payment_id,
            created_at,
        }
    }
}
