//! Agent directory, plan catalog and ownership record interfaces.
//!
//! The engines only read through these; the write methods exist for
//! registration and admin workflows that live outside the engine.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::Result;
use crate::model::{Agent, AgentId, ChainSettings, PaymentId, Plan, PlanId};

/// Source of sponsor back-references and activation flags.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, agent_id: AgentId) -> Result<Option<Agent>>;

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Agent>>;

    /// Register a new agent.
    ///
    /// Fails with `Duplicate` if the id or referral code is already in use.
    async fn register_agent(&self, agent: &Agent) -> Result<()>;

    /// Toggle activation. Fails with `NotFound` for unknown agents.
    async fn set_active(&self, agent_id: AgentId, is_active: bool) -> Result<()>;
}

/// Plan definitions, per-plan chain settings and the global commission rate.
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    async fn get_plan(&self, plan_id: PlanId) -> Result<Option<Plan>>;

    /// Create or replace a plan definition.
    async fn upsert_plan(&self, plan: &Plan) -> Result<()>;

    async fn chain_settings(&self, plan_id: PlanId) -> Result<Option<ChainSettings>>;

    /// Set chain settings for a plan.
    ///
    /// Rejects `pairing_limit == 0`, and rejects changing an existing
    /// `pairing_limit` once the plan's current partition holds any node.
    async fn set_chain_settings(&self, plan_id: PlanId, settings: ChainSettings) -> Result<()>;

    /// The flat percentage applied at every sponsor-chain level.
    async fn commission_rate(&self) -> Result<Option<Decimal>>;

    async fn set_commission_rate(&self, percentage: Decimal) -> Result<()>;
}

/// Record of which agents have purchased which plans.
#[async_trait]
pub trait OwnershipRecord: Send + Sync {
    async fn owns_plan(&self, agent_id: AgentId, plan_id: PlanId) -> Result<bool>;

    /// Record a purchase. Recording the same ownership twice is a no-op.
    async fn record_ownership(
        &self,
        agent_id: AgentId,
        plan_id: PlanId,
        payment_id: Option<PaymentId>,
    ) -> Result<()>;
}
