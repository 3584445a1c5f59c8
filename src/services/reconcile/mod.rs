//! Orphaned node detection and repair.
//!
//! A node is orphaned when its own `(parent_id, position)` names a slot that
//! the parent does not point back from. Stores write both halves atomically,
//! so orphans only come from data written outside the engine or by a store
//! that lost a write. The sweep restores the missing pointer when the slot is
//! still empty and flags everything else for manual review.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::model::{AgentId, Partition, Violation};
use crate::storage::{Result, StorageError, TreeStore};

/// A node the sweep could not repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedNode {
    pub agent_id: AgentId,
    pub parent_id: AgentId,
    pub slot: Option<u32>,
    /// Node the parent's slot points to instead, if any.
    pub occupant: Option<AgentId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub repaired: Vec<AgentId>,
    pub flagged: Vec<FlaggedNode>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty() && self.flagged.is_empty()
    }
}

pub struct Reconciler {
    tree: Arc<dyn TreeStore>,
}

impl Reconciler {
    pub fn new(tree: Arc<dyn TreeStore>) -> Self {
        Self { tree }
    }

    /// Scan one partition and repair what can be repaired.
    #[tracing::instrument(name = "reconcile.sweep", skip(self))]
    pub async fn sweep(&self, pairing_limit: u32) -> Result<ReconcileReport> {
        let nodes = self.tree.load_partition(pairing_limit).await?;
        let partition = Partition::new(pairing_limit, nodes);
        let mut report = ReconcileReport {
            scanned: partition.len(),
            ..ReconcileReport::default()
        };

        for orphan in partition.orphans() {
            let (Some(parent_id), Some(slot)) = (orphan.parent_id, orphan.position.slot()) else {
                continue;
            };
            let occupant = partition.node(&parent_id).and_then(|p| p.child(slot));
            if occupant.is_some() {
                warn!(agent_id = %orphan.agent_id, parent = %parent_id, slot, "Slot held by another node");
                report.flagged.push(FlaggedNode {
                    agent_id: orphan.agent_id,
                    parent_id,
                    slot: Some(slot),
                    occupant,
                });
                continue;
            }

            match self
                .tree
                .set_slot(pairing_limit, parent_id, slot, orphan.agent_id)
                .await
            {
                Ok(()) => {
                    info!(agent_id = %orphan.agent_id, parent = %parent_id, slot, "Slot pointer restored");
                    report.repaired.push(orphan.agent_id);
                }
                Err(StorageError::SlotTaken { .. }) => {
                    let occupant = self
                        .tree
                        .find_node(parent_id, pairing_limit)
                        .await?
                        .and_then(|p| p.child(slot));
                    warn!(agent_id = %orphan.agent_id, parent = %parent_id, slot, "Slot claimed during sweep");
                    report.flagged.push(FlaggedNode {
                        agent_id: orphan.agent_id,
                        parent_id,
                        slot: Some(slot),
                        occupant,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        for violation in partition.check_invariants() {
            if let Violation::MissingParent { node, parent } = violation {
                warn!(agent_id = %node, parent = %parent, "Parent missing from partition");
                report.flagged.push(FlaggedNode {
                    agent_id: node,
                    parent_id: parent,
                    slot: partition.node(&node).and_then(|n| n.position.slot()),
                    occupant: None,
                });
            }
        }

        info!(
            scanned = report.scanned,
            repaired = report.repaired.len(),
            flagged = report.flagged.len(),
            "Sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests;
