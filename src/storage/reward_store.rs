//! RewardStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::model::{AgentId, PairingCredit, PairingEvent, PlanId, PlanReward, RewardId};

/// Interface for pairing reward entitlements.
///
/// At most one unreleased reward exists per `(agent_id, plan_id)`.
#[async_trait]
pub trait RewardStore: Send + Sync {
    /// Establish an entitlement. Fails with `Duplicate` if the agent already
    /// holds an unreleased reward for the plan.
    async fn create_reward(&self, reward: &PlanReward) -> Result<()>;

    async fn get_reward(&self, reward_id: RewardId) -> Result<Option<PlanReward>>;

    async fn find_unreleased(&self, agent_id: AgentId, plan_id: PlanId) -> Result<Option<PlanReward>>;

    async fn list_rewards(&self, agent_id: AgentId) -> Result<Vec<PlanReward>>;

    /// Credit one child placement to the agent's unreleased reward.
    ///
    /// The guarded increment, the threshold check, the release flag and the
    /// level-0 payout commit together or not at all. A child already
    /// credited to the reward is not counted again, so a failed or repeated
    /// call can be retried safely.
    ///
    /// Returns `None` if the parent holds no unreleased reward for the plan.
    async fn credit_pairing(
        &self,
        event: PairingEvent,
        credited_at: DateTime<Utc>,
    ) -> Result<Option<PairingCredit>>;
}
