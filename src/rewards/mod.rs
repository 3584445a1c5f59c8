//! Pairing completion tracking.
//!
//! Every successful non-root placement counts as one completed pairing for
//! the node it landed under. When that parent's counter reaches its
//! threshold, the locked bonus is released as a level-0 commission.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

pub use crate::model::PairingEvent;
use crate::model::{Commission, RewardId};
use crate::storage::{Result, RewardStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PairingOutcome {
    /// The parent holds no unreleased reward for the plan.
    Untracked,
    /// Counter advanced, or this child was already counted; no release.
    Progress {
        reward_id: RewardId,
        completed: u32,
        limit: u32,
    },
    /// This call released the reward and emitted its bonus.
    Released(Commission),
}

pub struct PairingTracker {
    rewards: Arc<dyn RewardStore>,
}

impl PairingTracker {
    pub fn new(rewards: Arc<dyn RewardStore>) -> Self {
        Self { rewards }
    }

    /// Credit a child placement to its parent's reward.
    ///
    /// Safe to repeat for the same event: a child counts once per reward.
    #[tracing::instrument(name = "pairing.record", skip_all, fields(parent = %event.parent_id, plan = %event.plan_id))]
    pub async fn record_pairing(&self, event: PairingEvent) -> Result<PairingOutcome> {
        let Some(credit) = self.rewards.credit_pairing(event, Utc::now()).await? else {
            debug!("No unreleased reward for parent");
            return Ok(PairingOutcome::Untracked);
        };

        let reward = credit.reward;
        if let Some(commission) = credit.payout {
            info!(
                reward_id = %reward.id,
                amount = %commission.commission_amount,
                "Pairing reward released"
            );
            return Ok(PairingOutcome::Released(commission));
        }

        if !credit.counted {
            debug!(reward_id = %reward.id, from = %event.from_agent_id, "Pairing already counted");
        } else {
            debug!(
                completed = reward.pairing_completed,
                limit = reward.pairing_limit,
                "Pairing progress"
            );
        }
        Ok(PairingOutcome::Progress {
            reward_id: reward.id,
            completed: reward.pairing_completed,
            limit: reward.pairing_limit,
        })
    }
}
