//! Purchase confirmation workflow.
//!
//! Runs everything a confirmed payment triggers: ownership, the pairing-bonus
//! entitlement, tree placement and sponsor-chain commissions. Placement and
//! commission failures are reported in the outcome and logged; neither blocks
//! the other.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::commission::{CommissionEngine, CommissionError, CommissionRequest, CommissionSummary};
use crate::config::Config;
use crate::model::{AgentId, PaymentId, PlanId, PlanReward};
use crate::placement::{Placement, PlacementEngine, PlacementError};
use crate::rewards::{PairingOutcome, PairingTracker};
use crate::storage::{
    AgentDirectory, OwnershipRecord, PlanCatalog, Result, RewardStore, StorageError, Stores,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseEvent {
    pub payment_id: PaymentId,
    pub agent_id: AgentId,
    pub plan_id: PlanId,
    pub amount: Decimal,
}

#[derive(Debug)]
pub struct PurchaseOutcome {
    /// A pairing-bonus entitlement was created by this purchase.
    pub reward_created: bool,
    pub placement: std::result::Result<Placement, PlacementError>,
    pub commissions: std::result::Result<CommissionSummary, CommissionError>,
}

pub struct PurchaseProcessor {
    agents: Arc<dyn AgentDirectory>,
    plans: Arc<dyn PlanCatalog>,
    ownership: Arc<dyn OwnershipRecord>,
    rewards: Arc<dyn RewardStore>,
    placement: PlacementEngine,
    commissions: CommissionEngine,
}

impl PurchaseProcessor {
    pub fn new(stores: &Stores, config: &Config) -> Self {
        let placement = PlacementEngine::new(
            stores.plans.clone(),
            stores.ownership.clone(),
            stores.tree.clone(),
            PairingTracker::new(stores.rewards.clone()),
            config.placement.clone(),
        );
        let commissions = CommissionEngine::new(
            stores.agents.clone(),
            stores.plans.clone(),
            stores.ledger.clone(),
            config.commission.clone(),
        );
        Self {
            agents: stores.agents.clone(),
            plans: stores.plans.clone(),
            ownership: stores.ownership.clone(),
            rewards: stores.rewards.clone(),
            placement,
            commissions,
        }
    }

    pub fn placement(&self) -> &PlacementEngine {
        &self.placement
    }

    pub fn commissions(&self) -> &CommissionEngine {
        &self.commissions
    }

    /// Handle a confirmed payment.
    ///
    /// Errors only when the purchase itself cannot be recorded.
    #[tracing::instrument(name = "purchase.confirmed", skip_all, fields(payment = %event.payment_id, agent = %event.agent_id, plan = %event.plan_id))]
    pub async fn on_payment_confirmed(&self, event: PurchaseEvent) -> Result<PurchaseOutcome> {
        let agent = self
            .agents
            .get_agent(event.agent_id)
            .await?
            .ok_or_else(|| StorageError::not_found("agent", event.agent_id))?;
        let plan = self
            .plans
            .get_plan(event.plan_id)
            .await?
            .ok_or_else(|| StorageError::not_found("plan", event.plan_id))?;

        self.ownership
            .record_ownership(agent.id, plan.id, Some(event.payment_id))
            .await?;

        let reward_created = match plan.pairing_bonus {
            Some(bonus) => self.create_entitlement(agent.id, plan.id, bonus).await?,
            None => false,
        };

        let placement = self
            .placement
            .place_agent(agent.id, plan.id, agent.sponsor_id, Some(event.payment_id))
            .await;
        match &placement {
            Err(e @ PlacementError::PairingFailed { .. }) => {
                error!(error = %e, "Agent placed but parent not credited, retry with retry_pairing");
            }
            Err(e) => warn!(error = %e, "Tree placement failed, continuing with commissions"),
            Ok(_) => {}
        }

        let request = CommissionRequest {
            payment_id: Some(event.payment_id),
            purchaser_id: agent.id,
            plan_id: plan.id,
            plan_amount: event.amount,
        };
        let commissions = self.commissions.calculate_commissions(&request).await;
        if let Err(e) = &commissions {
            error!(error = %e, "Commission calculation failed, can be recalculated later");
        }

        info!(
            placed = placement.is_ok(),
            commissions = commissions.as_ref().map(|s| s.commissions_created).unwrap_or(0),
            "Purchase processed"
        );
        Ok(PurchaseOutcome {
            reward_created,
            placement,
            commissions,
        })
    }

    /// Re-drive the parent credit for a purchase whose placement ended in
    /// [`PlacementError::PairingFailed`]. Repeating it never double counts.
    pub async fn retry_pairing(
        &self,
        event: &PurchaseEvent,
    ) -> std::result::Result<PairingOutcome, PlacementError> {
        self.placement
            .retry_pairing(event.agent_id, event.plan_id, Some(event.payment_id))
            .await
    }

    async fn create_entitlement(&self, agent_id: AgentId, plan_id: PlanId, bonus: Decimal) -> Result<bool> {
        let Some(settings) = self.plans.chain_settings(plan_id).await? else {
            warn!("Plan carries a pairing bonus but no chain settings");
            return Ok(false);
        };
        let reward = PlanReward::new(agent_id, plan_id, settings.pairing_limit, bonus);
        match self.rewards.create_reward(&reward).await {
            Ok(()) => {
                info!(reward_id = %reward.id, amount = %bonus, "Pairing bonus entitlement created");
                Ok(true)
            }
            Err(StorageError::Duplicate(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
