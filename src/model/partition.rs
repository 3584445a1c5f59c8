//! In-memory arena over one pairing-limit partition.
//!
//! Built from a store snapshot and used for target selection, network views
//! and invariant checks. Never written back directly.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use super::{AgentId, Position, TreeNode};

/// A single invariant violation found by [`Partition::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Violation {
    MultipleRoots(Vec<AgentId>),
    MissingParent { node: AgentId, parent: AgentId },
    LevelMismatch { node: AgentId, expected: u32, actual: u32 },
    PointerMismatch { parent: AgentId, slot: u32, child: AgentId },
    SlotCollision { parent: AgentId, slot: u32, nodes: Vec<AgentId> },
    RootHasParent(AgentId),
    ChildWithoutParent(AgentId),
    FanoutMismatch { node: AgentId, expected: u32, actual: usize },
}

/// A node as listed in a downline view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownlineEntry {
    pub agent_id: AgentId,
    pub parent_id: Option<AgentId>,
    pub position: Position,
    pub level: u32,
    /// Hops below the agent the view was requested for.
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct Partition {
    pairing_limit: u32,
    nodes: HashMap<AgentId, TreeNode>,
}

impl Partition {
    pub fn new(pairing_limit: u32, nodes: impl IntoIterator<Item = TreeNode>) -> Self {
        Self {
            pairing_limit,
            nodes: nodes.into_iter().map(|n| (n.agent_id, n)).collect(),
        }
    }

    pub fn pairing_limit(&self) -> u32 {
        self.pairing_limit
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, agent_id: &AgentId) -> Option<&TreeNode> {
        self.nodes.get(agent_id)
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.nodes.contains_key(agent_id)
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.nodes.values().find(|n| n.position.is_root())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    /// Breadth-first listing of `agent_id`'s descendants, up to `max_depth`
    /// hops below it (`None` for the whole subtree). Siblings appear in slot
    /// order.
    pub fn downline(&self, agent_id: &AgentId, max_depth: Option<u32>) -> Vec<DownlineEntry> {
        let mut out = Vec::new();
        let Some(start) = self.nodes.get(agent_id) else {
            return out;
        };

        let mut queue = VecDeque::from([(start, 0u32)]);
        while let Some((node, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for child_id in node.occupied_children() {
                if let Some(child) = self.nodes.get(&child_id) {
                    out.push(DownlineEntry {
                        agent_id: child.agent_id,
                        parent_id: child.parent_id,
                        position: child.position,
                        level: child.level,
                        depth: depth + 1,
                    });
                    queue.push_back((child, depth + 1));
                }
            }
        }
        out
    }

    /// Check every structural invariant of the partition.
    ///
    /// Returns an empty vector for a consistent tree.
    pub fn check_invariants(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        let mut roots: Vec<AgentId> = self
            .nodes
            .values()
            .filter(|n| n.position.is_root())
            .map(|n| n.agent_id)
            .collect();
        if roots.len() > 1 {
            roots.sort();
            violations.push(Violation::MultipleRoots(roots));
        }

        let mut claimed: HashMap<(AgentId, u32), Vec<AgentId>> = HashMap::new();

        for node in self.nodes.values() {
            if node.children.len() != self.pairing_limit as usize {
                violations.push(Violation::FanoutMismatch {
                    node: node.agent_id,
                    expected: self.pairing_limit,
                    actual: node.children.len(),
                });
            }

            match (node.position, node.parent_id) {
                (Position::Root, Some(_)) => violations.push(Violation::RootHasParent(node.agent_id)),
                (Position::Child(_), None) => {
                    violations.push(Violation::ChildWithoutParent(node.agent_id))
                }
                (Position::Child(slot), Some(parent_id)) => {
                    claimed.entry((parent_id, slot)).or_default().push(node.agent_id);
                    match self.nodes.get(&parent_id) {
                        None => violations.push(Violation::MissingParent {
                            node: node.agent_id,
                            parent: parent_id,
                        }),
                        Some(parent) => {
                            if node.level != parent.level + 1 {
                                violations.push(Violation::LevelMismatch {
                                    node: node.agent_id,
                                    expected: parent.level + 1,
                                    actual: node.level,
                                });
                            }
                            if parent.child(slot) != Some(node.agent_id) {
                                violations.push(Violation::PointerMismatch {
                                    parent: parent_id,
                                    slot,
                                    child: node.agent_id,
                                });
                            }
                        }
                    }
                }
                (Position::Root, None) => {
                    if node.level != 1 {
                        violations.push(Violation::LevelMismatch {
                            node: node.agent_id,
                            expected: 1,
                            actual: node.level,
                        });
                    }
                }
            }

            // Forward pointers must be answered by the child's own parent/position.
            for (idx, child_id) in node.children.iter().enumerate() {
                let Some(child_id) = child_id else { continue };
                let slot = idx as u32 + 1;
                let agrees = self.nodes.get(child_id).is_some_and(|child| {
                    child.parent_id == Some(node.agent_id) && child.position == Position::Child(slot)
                });
                if !agrees {
                    violations.push(Violation::PointerMismatch {
                        parent: node.agent_id,
                        slot,
                        child: *child_id,
                    });
                }
            }
        }

        for ((parent, slot), mut nodes) in claimed {
            if nodes.len() > 1 {
                nodes.sort();
                violations.push(Violation::SlotCollision { parent, slot, nodes });
            }
        }

        violations
    }

    /// Nodes whose parent's slot pointer does not point back at them.
    pub fn orphans(&self) -> Vec<&TreeNode> {
        let mut out: Vec<&TreeNode> = self
            .nodes
            .values()
            .filter(|node| match (node.parent_id, node.position.slot()) {
                (Some(parent_id), Some(slot)) => self
                    .nodes
                    .get(&parent_id)
                    .is_some_and(|parent| parent.child(slot) != Some(node.agent_id)),
                _ => false,
            })
            .collect();
        out.sort_by_key(|n| (n.level, n.agent_id));
        out
    }
}
