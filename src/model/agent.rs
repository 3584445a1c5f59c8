//! Agents and the sponsor back-reference.

use serde::{Deserialize, Serialize};

use super::AgentId;

/// An agent as seen by the engine.
///
/// `sponsor_id` is a weak back-reference forming the linear sponsor chain.
/// Agents are never deleted because historical commissions reference them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub sponsor_id: Option<AgentId>,
    pub is_active: bool,
    pub referral_code: String,
}

impl Agent {
    /// Create an active agent with the given sponsor.
    pub fn new(sponsor_id: Option<AgentId>, referral_code: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            sponsor_id,
            is_active: true,
            referral_code: referral_code.into(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
