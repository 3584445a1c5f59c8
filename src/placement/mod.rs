//! Bounded-fanout tree placement.
//!
//! Each distinct `pairing_limit` is its own tree (a partition). Placing an
//! agent reads a snapshot of the partition, picks a target with
//! [`find_target`], and asks the [`TreeStore`] to attach the node. The store
//! rejects the write if another placement claimed the slot first; the engine
//! then reloads and tries again with backoff.

mod target;

pub use target::{find_target, PlacementTarget, TargetError};

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PlacementConfig;
use crate::model::{AgentId, ChainSettings, Partition, PaymentId, PlanId, TreeNode};
use crate::rewards::{PairingEvent, PairingOutcome, PairingTracker};
use crate::storage::{OwnershipRecord, PlanCatalog, StorageError, TreeStore};
use crate::utils::retry::placement_backoff;

/// Result type for placement operations.
pub type Result<T> = std::result::Result<T, PlacementError>;

#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("Plan {0} has no chain settings")]
    ConfigMissing(PlanId),

    #[error("Agent {agent_id} does not own plan {plan_id}")]
    OwnershipRequired { agent_id: AgentId, plan_id: PlanId },

    #[error("Root already exists for pairing limit {pairing_limit}")]
    RootExists { pairing_limit: u32 },

    #[error("Sponsor {0} has no node in this partition")]
    SponsorNotPositioned(AgentId),

    #[error("No open slot above max depth {max_depth}")]
    MaxDepthReached { max_depth: u32 },

    #[error("No open slot in the sponsor's subtree")]
    NoAvailablePosition,

    #[error("Gave up after {attempts} attempts losing slot races")]
    Contention { attempts: usize },

    /// The node was written but the parent's pairing counter was not updated.
    /// Recover with [`PlacementEngine::retry_pairing`].
    #[error("Agent {agent_id} placed under {parent_id} but pairing update failed: {source}")]
    PairingFailed {
        agent_id: AgentId,
        parent_id: AgentId,
        #[source]
        source: StorageError,
    },

    #[error("Agent {agent_id} has no node for pairing limit {pairing_limit}")]
    NotPlaced { agent_id: AgentId, pairing_limit: u32 },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

impl From<TargetError> for PlacementError {
    fn from(err: TargetError) -> Self {
        match err {
            TargetError::SponsorNotPositioned(id) => PlacementError::SponsorNotPositioned(id),
            TargetError::MaxDepthReached { max_depth } => PlacementError::MaxDepthReached { max_depth },
            TargetError::NoAvailablePosition => PlacementError::NoAvailablePosition,
        }
    }
}

/// What a successful `place_agent` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Placement {
    /// The agent already had a node in the partition; nothing was written.
    AlreadyPlaced(TreeNode),
    Root(TreeNode),
    Child {
        node: TreeNode,
        sponsor_id: AgentId,
        /// Placed under a descendant because the sponsor was full.
        redirected: bool,
        pairing: PairingOutcome,
    },
}

impl Placement {
    pub fn node(&self) -> &TreeNode {
        match self {
            Placement::AlreadyPlaced(node) | Placement::Root(node) => node,
            Placement::Child { node, .. } => node,
        }
    }

    pub fn is_new(&self) -> bool {
        !matches!(self, Placement::AlreadyPlaced(_))
    }
}

enum Attached {
    New(TreeNode, PlacementTarget),
    Existing(TreeNode),
}

pub struct PlacementEngine {
    plans: Arc<dyn PlanCatalog>,
    ownership: Arc<dyn OwnershipRecord>,
    tree: Arc<dyn TreeStore>,
    tracker: PairingTracker,
    config: PlacementConfig,
}

impl PlacementEngine {
    pub fn new(
        plans: Arc<dyn PlanCatalog>,
        ownership: Arc<dyn OwnershipRecord>,
        tree: Arc<dyn TreeStore>,
        tracker: PairingTracker,
        config: PlacementConfig,
    ) -> Self {
        Self {
            plans,
            ownership,
            tree,
            tracker,
            config,
        }
    }

    /// Place `agent_id` into the tree for `plan_id`'s pairing limit.
    ///
    /// With no sponsor the agent becomes the partition root. Otherwise it
    /// lands in the first open slot of the sponsor's subtree, breadth first.
    /// Repeating a successful call is a no-op.
    #[tracing::instrument(name = "placement.place", skip_all, fields(agent = %agent_id, plan = %plan_id))]
    pub async fn place_agent(
        &self,
        agent_id: AgentId,
        plan_id: PlanId,
        sponsor_id: Option<AgentId>,
        payment_id: Option<PaymentId>,
    ) -> Result<Placement> {
        let Some(settings) = self.plans.chain_settings(plan_id).await? else {
            warn!("Plan has no chain settings");
            return Err(PlacementError::ConfigMissing(plan_id));
        };
        if !self.ownership.owns_plan(agent_id, plan_id).await? {
            warn!("Placement requested before purchase");
            return Err(PlacementError::OwnershipRequired { agent_id, plan_id });
        }

        let pairing_limit = settings.pairing_limit;
        if let Some(existing) = self.tree.find_node(agent_id, pairing_limit).await? {
            debug!(pairing_limit, "Agent already placed");
            return Ok(Placement::AlreadyPlaced(existing));
        }

        match sponsor_id {
            None => self.place_root(agent_id, pairing_limit).await,
            Some(sponsor_id) => {
                self.place_child(agent_id, plan_id, sponsor_id, settings, payment_id)
                    .await
            }
        }
    }

    /// Credit an already placed agent to its parent's reward again.
    ///
    /// Used after [`PlacementError::PairingFailed`]: the node stays where it
    /// is and the parent counts the agent at most once, however often this
    /// runs. Roots have no parent and report `Untracked`.
    #[tracing::instrument(name = "placement.retry_pairing", skip_all, fields(agent = %agent_id, plan = %plan_id))]
    pub async fn retry_pairing(
        &self,
        agent_id: AgentId,
        plan_id: PlanId,
        payment_id: Option<PaymentId>,
    ) -> Result<PairingOutcome> {
        let Some(settings) = self.plans.chain_settings(plan_id).await? else {
            warn!("Plan has no chain settings");
            return Err(PlacementError::ConfigMissing(plan_id));
        };
        let pairing_limit = settings.pairing_limit;
        let Some(node) = self.tree.find_node(agent_id, pairing_limit).await? else {
            warn!(pairing_limit, "Pairing retry for an agent with no node");
            return Err(PlacementError::NotPlaced {
                agent_id,
                pairing_limit,
            });
        };
        match node.parent_id {
            Some(parent_id) => self.credit_parent(agent_id, parent_id, plan_id, payment_id).await,
            None => Ok(PairingOutcome::Untracked),
        }
    }

    /// Snapshot of one partition, for network views and invariant checks.
    pub async fn partition(&self, pairing_limit: u32) -> Result<Partition> {
        let nodes = self.tree.load_partition(pairing_limit).await?;
        Ok(Partition::new(pairing_limit, nodes))
    }

    async fn place_root(&self, agent_id: AgentId, pairing_limit: u32) -> Result<Placement> {
        match self.tree.insert_root(agent_id, pairing_limit).await {
            Ok(node) => {
                info!(pairing_limit, "Root placed");
                Ok(Placement::Root(node))
            }
            Err(StorageError::RootExists { pairing_limit }) => {
                warn!(pairing_limit, "Root already exists");
                Err(PlacementError::RootExists { pairing_limit })
            }
            Err(StorageError::AlreadyPlaced { .. }) => self.existing(agent_id, pairing_limit).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to insert root");
                Err(e.into())
            }
        }
    }

    async fn place_child(
        &self,
        agent_id: AgentId,
        plan_id: PlanId,
        sponsor_id: AgentId,
        settings: ChainSettings,
        payment_id: Option<PaymentId>,
    ) -> Result<Placement> {
        let attached = (|| async { self.try_attach(agent_id, sponsor_id, settings).await })
            .retry(placement_backoff(&self.config))
            .when(is_slot_race)
            .notify(|err: &PlacementError, dur: Duration| {
                debug!(error = %err, delay = ?dur, "Lost slot race, retrying");
            })
            .await;

        let (node, target) = match attached {
            Ok(Attached::New(node, target)) => (node, target),
            Ok(Attached::Existing(node)) => return Ok(Placement::AlreadyPlaced(node)),
            Err(e) if is_slot_race(&e) => {
                warn!(attempts = self.config.max_attempts, "Placement retries exhausted");
                return Err(PlacementError::Contention {
                    attempts: self.config.max_attempts,
                });
            }
            Err(e) => return Err(e),
        };

        info!(
            parent = %target.parent_id,
            slot = target.slot,
            level = target.level,
            redirected = target.redirected(),
            "Agent placed"
        );

        let pairing = self
            .credit_parent(agent_id, target.parent_id, plan_id, payment_id)
            .await?;

        Ok(Placement::Child {
            node,
            sponsor_id,
            redirected: target.redirected(),
            pairing,
        })
    }

    async fn credit_parent(
        &self,
        agent_id: AgentId,
        parent_id: AgentId,
        plan_id: PlanId,
        payment_id: Option<PaymentId>,
    ) -> Result<PairingOutcome> {
        let event = PairingEvent {
            parent_id,
            plan_id,
            from_agent_id: agent_id,
            payment_id,
        };
        self.tracker.record_pairing(event).await.map_err(|source| {
            tracing::error!(parent = %parent_id, error = %source, "Pairing update failed after placement");
            PlacementError::PairingFailed {
                agent_id,
                parent_id,
                source,
            }
        })
    }

    async fn try_attach(
        &self,
        agent_id: AgentId,
        sponsor_id: AgentId,
        settings: ChainSettings,
    ) -> Result<Attached> {
        let partition = self.partition(settings.pairing_limit).await?;
        if let Some(existing) = partition.node(&agent_id) {
            return Ok(Attached::Existing(existing.clone()));
        }

        let target = find_target(&partition, sponsor_id, settings.max_depth).map_err(|e| {
            warn!(sponsor = %sponsor_id, error = %e, "No placement target");
            PlacementError::from(e)
        })?;
        debug!(parent = %target.parent_id, slot = target.slot, "Target selected");

        match self
            .tree
            .attach_child(settings.pairing_limit, target.parent_id, target.slot, agent_id)
            .await
        {
            Ok(node) => Ok(Attached::New(node, target)),
            Err(StorageError::AlreadyPlaced { .. }) => {
                let node = self.require_node(agent_id, settings.pairing_limit).await?;
                Ok(Attached::Existing(node))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn existing(&self, agent_id: AgentId, pairing_limit: u32) -> Result<Placement> {
        let node = self.require_node(agent_id, pairing_limit).await?;
        Ok(Placement::AlreadyPlaced(node))
    }

    async fn require_node(&self, agent_id: AgentId, pairing_limit: u32) -> Result<TreeNode> {
        self.tree
            .find_node(agent_id, pairing_limit)
            .await?
            .ok_or_else(|| StorageError::not_found("tree node", agent_id).into())
    }
}

fn is_slot_race(err: &PlacementError) -> bool {
    matches!(err, PlacementError::Persistence(StorageError::SlotTaken { .. }))
}
