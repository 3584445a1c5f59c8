//! TreeStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{AgentId, TreeNode};

/// Interface for tree node persistence.
///
/// Nodes are keyed by `(agent_id, pairing_limit)`; each distinct
/// `pairing_limit` is an independent tree (a partition). Nodes are
/// append-only: once inserted they are never moved or deleted.
///
/// # Implementations
///
/// - `SqliteStore`: SQLite storage
/// - `MockStore`: In-memory storage for tests and embedding
#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn find_node(&self, agent_id: AgentId, pairing_limit: u32) -> Result<Option<TreeNode>>;

    /// Snapshot of every node in one partition.
    async fn load_partition(&self, pairing_limit: u32) -> Result<Vec<TreeNode>>;

    /// Insert the root of a partition.
    ///
    /// Fails with `RootExists` if the partition already has a root, or
    /// `AlreadyPlaced` if the agent already has a node there.
    async fn insert_root(&self, agent_id: AgentId, pairing_limit: u32) -> Result<TreeNode>;

    /// Insert `agent_id` into `slot` under `parent_id` and set the parent's
    /// slot pointer, as one atomic write.
    ///
    /// The stored level is derived from the parent at insert time.
    ///
    /// Errors:
    /// - `NotFound` if the parent has no node in the partition
    /// - `InvalidSlot` if `slot` is outside `1..=pairing_limit`
    /// - `SlotTaken` if another node already occupies the slot
    /// - `AlreadyPlaced` if the agent already has a node in the partition
    async fn attach_child(
        &self,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        agent_id: AgentId,
    ) -> Result<TreeNode>;

    /// Point an empty parent slot at an existing child. Used to repair
    /// nodes whose parent pointer was never written.
    ///
    /// Fails with `SlotTaken` if the slot already points elsewhere.
    async fn set_slot(
        &self,
        pairing_limit: u32,
        parent_id: AgentId,
        slot: u32,
        child_id: AgentId,
    ) -> Result<()>;
}
