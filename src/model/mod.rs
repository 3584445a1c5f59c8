//! Domain types shared by the stores and engines.

mod agent;
mod commission;
mod ids;
mod partition;
mod plan;
mod reward;
mod tree;

pub use agent::Agent;
pub use commission::{Commission, CommissionStatus, NewCommission, PAIRING_BONUS_LEVEL};
pub use ids::{AgentId, CommissionId, PaymentId, PlanId, RewardId};
pub use partition::{DownlineEntry, Partition, Violation};
pub use plan::{ChainSettings, Plan};
pub use reward::{PairingCredit, PairingEvent, PlanReward};
pub use tree::{InvalidPosition, Position, TreeNode};
