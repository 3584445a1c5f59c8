//! Tree nodes and slot positions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::AgentId;

const ROOT: &str = "root";
const CHILD_PREFIX: &str = "child_";

/// Symbolic slot a node occupies under its parent.
///
/// Slots are 1-based: `Child(1)` is the leftmost slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Position {
    Root,
    Child(u32),
}

impl Position {
    pub fn is_root(&self) -> bool {
        matches!(self, Position::Root)
    }

    /// Slot index for child positions.
    pub fn slot(&self) -> Option<u32> {
        match self {
            Position::Root => None,
            Position::Child(slot) => Some(*slot),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Root => f.write_str(ROOT),
            Position::Child(slot) => write!(f, "{CHILD_PREFIX}{slot}"),
        }
    }
}

/// Error parsing a persisted position string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid position: {0}")]
pub struct InvalidPosition(pub String);

impl FromStr for Position {
    type Err = InvalidPosition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOT {
            return Ok(Position::Root);
        }
        s.strip_prefix(CHILD_PREFIX)
            .and_then(|slot| slot.parse::<u32>().ok())
            .filter(|slot| *slot >= 1)
            .map(Position::Child)
            .ok_or_else(|| InvalidPosition(s.to_string()))
    }
}

impl From<Position> for String {
    fn from(position: Position) -> Self {
        position.to_string()
    }
}

impl TryFrom<String> for Position {
    type Error = InvalidPosition;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One agent's position in one pairing-limit partition.
///
/// `children[k - 1]` holds the occupant of slot `k`; the vector always has
/// `pairing_limit` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub agent_id: AgentId,
    pub pairing_limit: u32,
    pub parent_id: Option<AgentId>,
    pub position: Position,
    pub level: u32,
    pub children: Vec<Option<AgentId>>,
}

impl TreeNode {
    /// A new root for the given partition.
    pub fn root(agent_id: AgentId, pairing_limit: u32) -> Self {
        Self {
            agent_id,
            pairing_limit,
            parent_id: None,
            position: Position::Root,
            level: 1,
            children: vec![None; pairing_limit as usize],
        }
    }

    /// A new node placed in `slot` under `parent`.
    pub fn child_of(agent_id: AgentId, parent: &TreeNode, slot: u32) -> Self {
        Self {
            agent_id,
            pairing_limit: parent.pairing_limit,
            parent_id: Some(parent.agent_id),
            position: Position::Child(slot),
            level: parent.level + 1,
            children: vec![None; parent.pairing_limit as usize],
        }
    }

    /// Lowest-index empty slot, if any.
    pub fn first_open_slot(&self) -> Option<u32> {
        self.children
            .iter()
            .position(Option::is_none)
            .map(|idx| idx as u32 + 1)
    }

    pub fn child(&self, slot: u32) -> Option<AgentId> {
        slot.checked_sub(1)
            .and_then(|idx| self.children.get(idx as usize).copied().flatten())
    }

    /// Occupied child pointers in slot order.
    pub fn occupied_children(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.children.iter().filter_map(|c| *c)
    }

    pub fn is_full(&self) -> bool {
        self.first_open_slot().is_none()
    }
}
