//! In-memory storage implementation.
//!
//! All tables live behind one `RwLock`, so every trait method runs as a
//! single critical section and multi-table writes are atomic. Used by tests
//! and by embedders that do not need durability.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{
    AgentDirectory, CommissionLedger, OwnershipRecord, PlanCatalog, Result, RewardStore,
    StorageError, TreeStore,
};
use crate::model::{
    Agent, AgentId, ChainSettings, Commission, NewCommission, PairingCredit, PairingEvent,
    PaymentId, Plan, PlanId, PlanReward, RewardId, TreeNode, PAIRING_BONUS_LEVEL,
};

#[derive(Default)]
struct Tables {
    agents: HashMap<AgentId, Agent>,
    plans: HashMap<PlanId, Plan>,
    settings: HashMap<PlanId, ChainSettings>,
    commission_rate: Option<Decimal>,
    ownership: HashMap<(AgentId, PlanId), Option<PaymentId>>,
    nodes: HashMap<(u32, AgentId), TreeNode>,
    rewards: HashMap<RewardId, PlanReward>,
    pairing_credits: HashSet<(RewardId, AgentId)>,
    commissions: Vec<Commission>,
}

impl Tables {
    fn partition_has_nodes(&self, pairing_limit: u32) -> bool {
        self.nodes.keys().any(|(limit, _)| *limit == pairing_limit)
    }

    fn commission_key_taken(&self, entry: &NewCommission) -> bool {
        entry.payment_id.is_some()
            && self.commissions.iter().any(|c| {
                c.payment_id == entry.payment_id && c.agent_id == entry.agent_id && c.level == entry.level
            })
    }
}

/// In-memory store implementing every storage trait.
#[derive(Default)]
pub struct MockStore {
    tables: RwLock<Tables>,
    fail_on_attach: RwLock<bool>,
    fail_on_append: RwLock<bool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `attach_child` fail as if the database were unreachable.
    pub async fn set_fail_on_attach(&self, fail: bool) {
        *self.fail_on_attach.write().await = fail;
    }

    /// Make `append_batch` and the bonus payout of `credit_pairing` fail as if
    /// the database were unreachable.
    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// Insert a child node without setting the parent's slot pointer,
    /// reproducing a write that was interrupted halfway.
    pub async fn insert_detached(&self, node: TreeNode) {
        let mut tables = self.tables.write().await;
        tables.nodes.insert((node.pairing_limit, node.agent_id), node);
    }

    /// Every commission in insertion order.
    pub async fn all_commissions(&self) -> Vec<Commission> {
        self.tables.read().await.commissions.clone()
    }
}

#[async_trait]
impl AgentDirectory for MockStore {
    async fn get_agent(&self, agent_id: AgentId) -> Result<Option<Agent>> {
        Ok(self.tables.read().await.agents.get(&agent_id).cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables.agents.values().find(|a| a.referral_code == code).cloned())
    }

    async fn register_agent(&self, agent: &Agent) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.agents.contains_key(&agent.id) {
            return Err(StorageError::Duplicate(format!("agent {}", agent.id)));
        }
        if tables.agents.values().any(|a| a.referral_code == agent.referral_code) {
            return Err(StorageError::Duplicate(format!(
                "referral code {}",
                agent.referral_code
            )));
        }
        tables.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn set_active(&self, agent_id: AgentId, is_active: bool) -> Result<()> {
        let mut tables = self.tables.write().await;
        let agent = tables
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| StorageError::not_found("agent", agent_id))?;
        agent.is_active = is_active;
        Ok(())
    }
}

#[async_trait]
impl PlanCatalog for MockStore {
    async fn get_plan(&self, plan_id: PlanId) -> Result<Option<Plan>> {
        Ok(self.tables.read().await.plans.get(&plan_id).cloned())
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<()> {
        self.tables.write().await.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn chain_settings(&self, plan_id: PlanId) -> Result<Option<ChainSettings>> {
        Ok(self.tables.read().await.settings.get(&plan_id).copied())
    }

    async fn set_chain_settings(&self, plan_id: PlanId, settings: ChainSettings) -> Result<()> {
        if settings.pairing_limit == 0 {
            return Err(StorageError::InvalidPairingLimit);
        }
        let mut tables = self.tables.write().await;
        if let Some(current) = tables.settings.get(&plan_id) {
            if current.pairing_limit != settings.pairing_limit
                && tables.partition_has_nodes(current.pairing_limit)
            {
                return Err(StorageError::PairingLimitLocked {
                    plan_id,
                    current: current.pairing_limit,
                    requested: settings.pairing_limit,
                });
            }
        }
        tables.settings.insert(plan_id, settings);
        Ok(())
    }

    async fn commission_rate(&self) -> Result<Option<Decimal>> {
        Ok(self.tables.read().await.commission_rate)
    }

    async fn set_commission_rate(&self, percentage: Decimal) -> Result<()> {
        self.tables.write().await.commission_rate = Some(percentage);
        Ok(())
    }
}

#[async_trait]
impl OwnershipRecord for MockStore {
    async fn owns_plan(&self, agent_id: AgentId, plan_id: PlanId) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .ownership
            .contains_key(&(agent_id, plan_id)))
    }

    async fn record_ownership(
        &self,
        agent_id: AgentId,
        plan_id: PlanId,
        payment_id: Option<PaymentId>,
    ) -> Result<()> {
        self.tables
            .write()
            .await
            .ownership
            .entry((agent_id, plan_id))
            .or_insert(payment_id);
        Ok(())
    }
}

#[async_trait]
impl TreeStore for MockStore {
    async fn find_node(&self, agent_id: AgentId, pairing_limit: u32) -> Result<Option<TreeNode>> {
        Ok(self
            .tables
            .read()
            .await
            .nodes
            .get(&(pairing_limit, agent_id))
            .cloned())
    }

    async fn load_partition(&self, pairing_limit: u32) -> Result<Vec<TreeNode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .nodes
            .iter()
            .filter(|((limit, _), _)| *limit == pairing_limit)
            .map(|(_, node)| node.clone())
            .collect())
    }

    async fn insert_root(&self, agent_id: AgentId, pairing_limit: u32) -> Result<TreeNode> {
        if pairing_limit == 0 {
            return Err(StorageError::InvalidPairingLimit);
        }
        let mut tables = self.tables.write().await;
        if tables.nodes.contains_key(&(pairing_limit, agent_id)) {
            return Err(StorageError::AlreadyPlaced {
                agent_id,
                pairing_limit,
            });
        }
        let has_root = tables
            .nodes
            .iter()
            .any(|((limit, _), node)| *limit == pairing_limit && node.position.is_root());
        if has_root {
            return Err(StorageError::RootExists { pairing_limit });
        }
        let node = TreeNode::root(agent_id, pairing_limit);
        tables.nodes.insert((pairing_limit, agent_id), node.clone());
        Ok(node)
    }

    async fn attach_child(
        &self,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        agent_id: AgentId,
    ) -> Result<TreeNode> {
        if *self.fail_on_attach.read().await {
            return Err(StorageError::Unavailable("attach_child".to_string()));
        }
        if slot == 0 || slot > pairing_limit {
            return Err(StorageError::InvalidSlot {
                slot,
                pairing_limit,
            });
        }

        let mut tables = self.tables.write().await;
        if tables.nodes.contains_key(&(pairing_limit, agent_id)) {
            return Err(StorageError::AlreadyPlaced {
                agent_id,
                pairing_limit,
            });
        }
        let parent = tables
            .nodes
            .get(&(pairing_limit, parent_id))
            .ok_or_else(|| StorageError::not_found("tree node", parent_id))?;
        let slot_claimed = parent.child(slot).is_some()
            || tables.nodes.values().any(|n| {
                n.pairing_limit == pairing_limit
                    && n.parent_id == Some(parent_id)
                    && n.position.slot() == Some(slot)
            });
        if slot_claimed {
            return Err(StorageError::SlotTaken { parent_id, slot });
        }

        let node = TreeNode::child_of(agent_id, parent, slot);
        if let Some(parent) = tables.nodes.get_mut(&(pairing_limit, parent_id)) {
            parent.children[slot as usize - 1] = Some(agent_id);
        }
        tables.nodes.insert((pairing_limit, agent_id), node.clone());
        Ok(node)
    }

    async fn set_slot(
        &self,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        child_id: AgentId,
    ) -> Result<()> {
        if slot == 0 || slot > pairing_limit {
            return Err(StorageError::InvalidSlot {
                slot,
                pairing_limit,
            });
        }
        let mut tables = self.tables.write().await;
        if !tables.nodes.contains_key(&(pairing_limit, child_id)) {
            return Err(StorageError::not_found("tree node", child_id));
        }
        let parent = tables
            .nodes
            .get_mut(&(pairing_limit, parent_id))
            .ok_or_else(|| StorageError::not_found("tree node", parent_id))?;
        let idx = slot as usize - 1;
        if parent.children[idx].is_some_and(|existing| existing != child_id) {
            return Err(StorageError::SlotTaken { parent_id, slot });
        }
        parent.children[idx] = Some(child_id);
        Ok(())
    }
}

#[async_trait]
impl RewardStore for MockStore {
    async fn create_reward(&self, reward: &PlanReward) -> Result<()> {
        let mut tables = self.tables.write().await;
        let open = tables.rewards.values().any(|r| {
            r.agent_id == reward.agent_id && r.plan_id == reward.plan_id && !r.is_released
        });
        if open || tables.rewards.contains_key(&reward.id) {
            return Err(StorageError::Duplicate(format!(
                "unreleased reward for agent {} plan {}",
                reward.agent_id, reward.plan_id
            )));
        }
        tables.rewards.insert(reward.id, reward.clone());
        Ok(())
    }

    async fn get_reward(&self, reward_id: RewardId) -> Result<Option<PlanReward>> {
        Ok(self.tables.read().await.rewards.get(&reward_id).cloned())
    }

    async fn find_unreleased(&self, agent_id: AgentId, plan_id: PlanId) -> Result<Option<PlanReward>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rewards
            .values()
            .find(|r| r.agent_id == agent_id && r.plan_id == plan_id && !r.is_released)
            .cloned())
    }

    async fn list_rewards(&self, agent_id: AgentId) -> Result<Vec<PlanReward>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rewards
            .values()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn credit_pairing(
        &self,
        event: PairingEvent,
        credited_at: DateTime<Utc>,
    ) -> Result<Option<PairingCredit>> {
        let fail_on_append = *self.fail_on_append.read().await;
        let mut tables = self.tables.write().await;
        let Some(mut reward) = tables
            .rewards
            .values()
            .find(|r| r.agent_id == event.parent_id && r.plan_id == event.plan_id && !r.is_released)
            .cloned()
        else {
            return Ok(None);
        };
        if tables.pairing_credits.contains(&(reward.id, event.from_agent_id)) {
            return Ok(Some(PairingCredit {
                reward,
                counted: false,
                payout: None,
            }));
        }

        // Nothing below mutates the tables until every check has passed.
        reward.pairing_completed += 1;
        let payout = if reward.threshold_reached() {
            let entry = reward.payout(event.from_agent_id, event.payment_id);
            if fail_on_append {
                return Err(StorageError::Unavailable("credit_pairing".to_string()));
            }
            if tables.commission_key_taken(&entry) {
                return Err(StorageError::Duplicate(format!(
                    "pairing bonus for agent {}",
                    entry.agent_id
                )));
            }
            reward.is_released = true;
            reward.released_at = Some(credited_at);
            Some(entry.into_commission(credited_at))
        } else {
            None
        };

        tables.pairing_credits.insert((reward.id, event.from_agent_id));
        tables.rewards.insert(reward.id, reward.clone());
        if let Some(commission) = &payout {
            tables.commissions.push(commission.clone());
        }
        Ok(Some(PairingCredit {
            reward,
            counted: true,
            payout,
        }))
    }
}

#[async_trait]
impl CommissionLedger for MockStore {
    async fn append_batch(&self, batch: Vec<NewCommission>) -> Result<Vec<Commission>> {
        if *self.fail_on_append.read().await {
            return Err(StorageError::Unavailable("append_batch".to_string()));
        }
        let mut tables = self.tables.write().await;
        for (idx, entry) in batch.iter().enumerate() {
            let repeated_in_batch = entry.payment_id.is_some()
                && batch[..idx].iter().any(|e| {
                    e.payment_id == entry.payment_id && e.agent_id == entry.agent_id && e.level == entry.level
                });
            if repeated_in_batch || tables.commission_key_taken(entry) {
                return Err(StorageError::Duplicate(format!(
                    "commission for agent {} level {}",
                    entry.agent_id, entry.level
                )));
            }
        }

        let now = Utc::now();
        let inserted: Vec<Commission> = batch
            .into_iter()
            .map(|entry| entry.into_commission(now))
            .collect();
        tables.commissions.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn list_for_agent(&self, agent_id: AgentId) -> Result<Vec<Commission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .commissions
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn list_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Commission>> {
        let tables = self.tables.read().await;
        let mut out: Vec<Commission> = tables
            .commissions
            .iter()
            .filter(|c| c.payment_id == Some(payment_id))
            .cloned()
            .collect();
        out.sort_by_key(|c| c.level);
        Ok(out)
    }

    async fn has_chain_commissions(&self, payment_id: PaymentId) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .commissions
            .iter()
            .any(|c| c.payment_id == Some(payment_id) && c.level > PAIRING_BONUS_LEVEL))
    }
}

#[cfg(test)]
mod tests;
