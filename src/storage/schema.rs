//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Agents table schema.
#[derive(Iden)]
pub enum Agents {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "sponsor_id"]
    SponsorId,
    #[iden = "is_active"]
    IsActive,
    #[iden = "referral_code"]
    ReferralCode,
}

/// Plans table schema.
#[derive(Iden)]
pub enum Plans {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "name"]
    Name,
    #[iden = "price"]
    Price,
    #[iden = "pairing_bonus"]
    PairingBonus,
}

/// Chain settings table schema.
#[derive(Iden)]
pub enum PlanChainSettings {
    Table,
    #[iden = "plan_id"]
    PlanId,
    #[iden = "pairing_limit"]
    PairingLimit,
    #[iden = "max_depth"]
    MaxDepth,
}

/// Commission rules table schema. Level 0 holds the global rate.
#[derive(Iden)]
pub enum CommissionRules {
    Table,
    #[iden = "level"]
    Level,
    #[iden = "percentage"]
    Percentage,
}

/// Plan ownership table schema.
#[derive(Iden)]
pub enum PlanOwnership {
    Table,
    #[iden = "agent_id"]
    AgentId,
    #[iden = "plan_id"]
    PlanId,
    #[iden = "payment_id"]
    PaymentId,
    #[iden = "created_at"]
    CreatedAt,
}

/// Tree nodes table schema.
#[derive(Iden)]
pub enum TreeNodes {
    Table,
    #[iden = "pairing_limit"]
    PairingLimit,
    #[iden = "agent_id"]
    AgentId,
    #[iden = "parent_id"]
    ParentId,
    #[iden = "position"]
    Position,
    #[iden = "level"]
    Level,
    #[iden = "created_at"]
    CreatedAt,
}

/// Tree slot pointers: one row per filled child slot.
#[derive(Iden)]
pub enum TreeSlots {
    Table,
    #[iden = "pairing_limit"]
    PairingLimit,
    #[iden = "parent_id"]
    ParentId,
    #[iden = "slot"]
    Slot,
    #[iden = "child_id"]
    ChildId,
}

/// Plan rewards table schema.
#[derive(Iden)]
pub enum PlanRewards {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "agent_id"]
    AgentId,
    #[iden = "plan_id"]
    PlanId,
    #[iden = "pairing_completed"]
    PairingCompleted,
    #[iden = "pairing_limit"]
    PairingLimit,
    #[iden = "locked_amount"]
    LockedAmount,
    #[iden = "is_released"]
    IsReleased,
    #[iden = "released_at"]
    ReleasedAt,
}

/// Pairing credits: one row per child counted toward a reward.
#[derive(Iden)]
pub enum PairingCredits {
    Table,
    #[iden = "reward_id"]
    RewardId,
    #[iden = "from_agent_id"]
    FromAgentId,
    #[iden = "created_at"]
    CreatedAt,
}

/// Commissions table schema.
#[derive(Iden)]
pub enum Commissions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "agent_id"]
    AgentId,
    #[iden = "from_agent_id"]
    FromAgentId,
    #[iden = "plan_id"]
    PlanId,
    #[iden = "commission_amount"]
    CommissionAmount,
    #[iden = "original_amount"]
    OriginalAmount,
    #[iden = "level"]
    Level,
    #[iden = "status"]
    Status,
    #[iden = "payment_id"]
    PaymentId,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQL for the agent directory, plan catalog and ownership tables.
pub const CREATE_DIRECTORY_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    sponsor_id TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    referral_code TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    price TEXT NOT NULL,
    pairing_bonus TEXT
);

CREATE TABLE IF NOT EXISTS plan_chain_settings (
    plan_id TEXT PRIMARY KEY,
    pairing_limit INTEGER NOT NULL CHECK (pairing_limit >= 1),
    max_depth INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS commission_rules (
    level INTEGER PRIMARY KEY,
    percentage TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plan_ownership (
    agent_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    payment_id TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, plan_id)
);
"#;

/// SQL for the tree tables.
///
/// The partial unique index allows one root per partition; the slot table's
/// primary key gives each (parent, slot) a single occupant.
pub const CREATE_TREE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS tree_nodes (
    pairing_limit INTEGER NOT NULL,
    agent_id TEXT NOT NULL,
    parent_id TEXT,
    position TEXT NOT NULL,
    level INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (pairing_limit, agent_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tree_nodes_root
    ON tree_nodes(pairing_limit) WHERE position = 'root';

CREATE UNIQUE INDEX IF NOT EXISTS idx_tree_nodes_parent_position
    ON tree_nodes(pairing_limit, parent_id, position) WHERE parent_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS tree_slots (
    pairing_limit INTEGER NOT NULL,
    parent_id TEXT NOT NULL,
    slot INTEGER NOT NULL,
    child_id TEXT NOT NULL,
    PRIMARY KEY (pairing_limit, parent_id, slot)
);
"#;

/// SQL for the reward and commission tables.
pub const CREATE_LEDGER_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS plan_rewards (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    pairing_completed INTEGER NOT NULL DEFAULT 0,
    pairing_limit INTEGER NOT NULL,
    locked_amount TEXT NOT NULL,
    is_released INTEGER NOT NULL DEFAULT 0,
    released_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_plan_rewards_open
    ON plan_rewards(agent_id, plan_id) WHERE is_released = 0;

CREATE TABLE IF NOT EXISTS pairing_credits (
    reward_id TEXT NOT NULL,
    from_agent_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (reward_id, from_agent_id)
);

CREATE TABLE IF NOT EXISTS commissions (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    from_agent_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    commission_amount TEXT NOT NULL,
    original_amount TEXT NOT NULL,
    level INTEGER NOT NULL,
    status TEXT NOT NULL,
    payment_id TEXT,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_commissions_payment
    ON commissions(payment_id, agent_id, level) WHERE payment_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_commissions_agent ON commissions(agent_id);
"#;
