//! Sponsor-chain commission engine.
//!
//! Pays the linear "who sponsored me" chain of a purchaser. The walk starts
//! at the purchaser's sponsor and follows `sponsor_id` for at most
//! `max_depth` hops. Inactive sponsors are skipped without ending the walk.
//! Each paid level takes the global percentage of whatever the previous
//! levels left (see [`waterfall`]).

mod waterfall;

pub use waterfall::{waterfall, Rounding, MONEY_SCALE};

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CommissionConfig;
use crate::model::{Agent, AgentId, CommissionStatus, NewCommission, PaymentId, PlanId};
use crate::storage::{AgentDirectory, CommissionLedger, PlanCatalog, StorageError};

/// Result type for commission operations.
pub type Result<T> = std::result::Result<T, CommissionError>;

#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("No global commission rate configured")]
    ConfigMissing,

    #[error("Commission rate {0} outside 0..=100")]
    InvalidRate(Decimal),

    #[error("Purchase amount {0} is negative")]
    InvalidAmount(Decimal),

    #[error("Purchaser {0} not found")]
    PurchaserNotFound(AgentId),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

/// A purchase to distribute commissions for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionRequest {
    pub payment_id: Option<PaymentId>,
    pub purchaser_id: AgentId,
    pub plan_id: PlanId,
    pub plan_amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommissionSummary {
    pub commissions_created: usize,
    pub total_distributed: Decimal,
    /// Amount left after the last paid level.
    pub remaining: Decimal,
}

impl CommissionSummary {
    fn nothing_paid(amount: Decimal) -> Self {
        Self {
            commissions_created: 0,
            total_distributed: Decimal::ZERO,
            remaining: amount,
        }
    }
}

/// An eligible ancestor and its hop distance from the purchaser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMember {
    pub level: u32,
    pub agent: Agent,
}

pub struct CommissionEngine {
    agents: Arc<dyn AgentDirectory>,
    plans: Arc<dyn PlanCatalog>,
    ledger: Arc<dyn CommissionLedger>,
    config: CommissionConfig,
}

impl CommissionEngine {
    pub fn new(
        agents: Arc<dyn AgentDirectory>,
        plans: Arc<dyn PlanCatalog>,
        ledger: Arc<dyn CommissionLedger>,
        config: CommissionConfig,
    ) -> Self {
        Self {
            agents,
            plans,
            ledger,
            config,
        }
    }

    /// Walk the sponsor chain upward from `first_sponsor`.
    ///
    /// Returns active ancestors tagged with their hop distance from the
    /// purchaser (the first sponsor is level 1). Stops at a null sponsor,
    /// after `max_depth` hops, at a dangling reference, or on a cycle.
    pub async fn sponsor_chain(&self, first_sponsor: AgentId, max_depth: u32) -> Result<Vec<ChainMember>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(first_sponsor);
        let mut level = 0u32;

        while let Some(agent_id) = next {
            if level >= max_depth {
                break;
            }
            level += 1;
            if !visited.insert(agent_id) {
                warn!(agent_id = %agent_id, level, "Sponsor chain cycle, stopping walk");
                break;
            }
            let Some(agent) = self.agents.get_agent(agent_id).await? else {
                warn!(agent_id = %agent_id, level, "Dangling sponsor reference, stopping walk");
                break;
            };
            next = agent.sponsor_id;
            if agent.is_active {
                chain.push(ChainMember { level, agent });
            } else {
                debug!(agent_id = %agent_id, level, "Skipping inactive sponsor");
            }
        }

        Ok(chain)
    }

    /// Distribute commissions for one purchase across the sponsor chain.
    ///
    /// A purchaser without a sponsor yields zero commissions. Calling again
    /// for a payment whose chain was already paid is a no-op.
    #[tracing::instrument(name = "commission.calculate", skip_all, fields(purchaser = %request.purchaser_id, plan = %request.plan_id))]
    pub async fn calculate_commissions(&self, request: &CommissionRequest) -> Result<CommissionSummary> {
        let amount = request.plan_amount;
        if amount.is_sign_negative() {
            return Err(CommissionError::InvalidAmount(amount));
        }

        let purchaser = self
            .agents
            .get_agent(request.purchaser_id)
            .await?
            .ok_or(CommissionError::PurchaserNotFound(request.purchaser_id))?;
        let Some(first_sponsor) = purchaser.sponsor_id else {
            debug!("Purchaser has no sponsor, nothing to distribute");
            return Ok(CommissionSummary::nothing_paid(amount));
        };

        if let Some(payment_id) = request.payment_id {
            if self.ledger.has_chain_commissions(payment_id).await? {
                info!(payment_id = %payment_id, "Commissions already distributed for payment");
                return Ok(CommissionSummary::nothing_paid(amount));
            }
        }

        let max_depth = self
            .plans
            .chain_settings(request.plan_id)
            .await?
            .map(|s| s.max_depth)
            .unwrap_or(self.config.default_max_depth);

        let percentage = self
            .plans
            .commission_rate()
            .await?
            .ok_or(CommissionError::ConfigMissing)?;
        if percentage.is_sign_negative() || percentage > Decimal::ONE_HUNDRED {
            return Err(CommissionError::InvalidRate(percentage));
        }

        let chain = self.sponsor_chain(first_sponsor, max_depth).await?;
        if chain.is_empty() {
            debug!(max_depth, "No active sponsors within depth");
            return Ok(CommissionSummary::nothing_paid(amount));
        }

        let shares = waterfall(amount, percentage, chain.len(), self.config.rounding);
        let total_distributed: Decimal = shares.iter().sum();
        let batch: Vec<NewCommission> = chain
            .iter()
            .zip(&shares)
            .map(|(member, share)| NewCommission {
                agent_id: member.agent.id,
                from_agent_id: request.purchaser_id,
                plan_id: request.plan_id,
                commission_amount: *share,
                original_amount: amount,
                level: member.level,
                status: CommissionStatus::Paid,
                payment_id: request.payment_id,
            })
            .collect();

        match self.ledger.append_batch(batch).await {
            Ok(inserted) => {
                info!(
                    commissions = inserted.len(),
                    total = %total_distributed,
                    "Commissions distributed"
                );
                Ok(CommissionSummary {
                    commissions_created: inserted.len(),
                    total_distributed,
                    remaining: amount - total_distributed,
                })
            }
            Err(StorageError::Duplicate(detail)) => {
                info!(detail = %detail, "Concurrent distribution already recorded for payment");
                Ok(CommissionSummary::nothing_paid(amount))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record commissions");
                Err(e.into())
            }
        }
    }
}
