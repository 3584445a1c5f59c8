//! Target selection over a partition snapshot.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::model::{AgentId, Partition, TreeNode};

/// Where a new agent should be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlacementTarget {
    pub sponsor_id: AgentId,
    pub parent_id: AgentId,
    /// 1-based slot under `parent_id`.
    pub slot: u32,
    /// Level the new node will have.
    pub level: u32,
}

impl PlacementTarget {
    /// True when the sponsor was full and the agent spills into its downline.
    pub fn redirected(&self) -> bool {
        self.parent_id != self.sponsor_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("Sponsor {0} has no node in this partition")]
    SponsorNotPositioned(AgentId),

    #[error("Every open slot in the sponsor's subtree is below max depth {max_depth}")]
    MaxDepthReached { max_depth: u32 },

    #[error("No open slot in the sponsor's subtree")]
    NoAvailablePosition,
}

/// Breadth-first search of the sponsor's subtree for the first open slot.
///
/// The sponsor itself is checked first, then its children in slot order, and
/// so on level by level. Nodes at `max_depth` or deeper cannot take children.
/// A slot counts as taken when either the parent's pointer or some child's
/// own `(parent_id, position)` claims it, so a half-written placement is never
/// offered again.
///
/// In a consistent tree some leaf always has a free slot, so
/// `NoAvailablePosition` only comes from damaged data: a cycle, or a slot
/// claimed by a node the search cannot reach (a dangling pointer or an
/// orphan whose parent pointer was never written).
pub fn find_target(
    partition: &Partition,
    sponsor_id: AgentId,
    max_depth: u32,
) -> Result<PlacementTarget, TargetError> {
    let sponsor = partition
        .node(&sponsor_id)
        .ok_or(TargetError::SponsorNotPositioned(sponsor_id))?;

    let claimed: HashSet<(AgentId, u32)> = partition
        .nodes()
        .filter_map(|n| Some((n.parent_id?, n.position.slot()?)))
        .collect();
    let open_slot = |node: &TreeNode| {
        (1..=partition.pairing_limit())
            .find(|slot| node.child(*slot).is_none() && !claimed.contains(&(node.agent_id, *slot)))
    };

    let mut depth_blocked = false;
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([sponsor]);
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node.agent_id) {
            continue;
        }
        if node.level >= max_depth {
            depth_blocked = true;
            continue;
        }
        if let Some(slot) = open_slot(node) {
            return Ok(PlacementTarget {
                sponsor_id,
                parent_id: node.agent_id,
                slot,
                level: node.level + 1,
            });
        }
        queue.extend(
            node.occupied_children()
                .filter_map(|child_id| partition.node(&child_id)),
        );
    }

    if depth_blocked {
        Err(TargetError::MaxDepthReached { max_depth })
    } else {
        Err(TargetError::NoAvailablePosition)
    }
}
