//! Storage interfaces and implementations.
//!
//! Every piece of persisted state the engines touch sits behind one of the
//! traits below. Coordination between concurrent placements happens here:
//! implementations must make each trait method atomic, and must reject a
//! write that would break slot exclusivity, the single-root rule or
//! double placement instead of silently overwriting.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::model::{AgentId, PlanId};

mod commission_ledger;
mod directory;
pub mod mock;
mod reward_store;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod tree_store;

pub use commission_ledger::CommissionLedger;
pub use directory::{AgentDirectory, OwnershipRecord, PlanCatalog};
pub use mock::MockStore;
pub use reward_store::RewardStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use tree_store::TreeStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Root already exists for pairing limit {pairing_limit}")]
    RootExists { pairing_limit: u32 },

    #[error("Agent {agent_id} already placed in pairing limit {pairing_limit}")]
    AlreadyPlaced { agent_id: AgentId, pairing_limit: u32 },

    #[error("Slot {slot} under {parent_id} is already taken")]
    SlotTaken { parent_id: AgentId, slot: u32 },

    #[error("Slot {slot} outside 1..={pairing_limit}")]
    InvalidSlot { slot: u32, pairing_limit: u32 },

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Pairing limit of plan {plan_id} is locked at {current}, cannot change to {requested}")]
    PairingLimitLocked {
        plan_id: PlanId,
        current: u32,
        requested: u32,
    },

    #[error("Pairing limit must be at least 1")]
    InvalidPairingLimit,

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid decimal: {0}")]
    InvalidDecimal(#[from] rust_decimal::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Handles to every store the engines need.
///
/// Backends that keep all tables in one database implement every trait on
/// one type; [`Stores::from_shared`] fans that single handle out.
#[derive(Clone)]
pub struct Stores {
    pub agents: Arc<dyn AgentDirectory>,
    pub plans: Arc<dyn PlanCatalog>,
    pub ownership: Arc<dyn OwnershipRecord>,
    pub tree: Arc<dyn TreeStore>,
    pub rewards: Arc<dyn RewardStore>,
    pub ledger: Arc<dyn CommissionLedger>,
}

impl Stores {
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: AgentDirectory
            + PlanCatalog
            + OwnershipRecord
            + TreeStore
            + RewardStore
            + CommissionLedger
            + 'static,
    {
        Self {
            agents: store.clone(),
            plans: store.clone(),
            ownership: store.clone(),
            tree: store.clone(),
            rewards: store.clone(),
            ledger: store,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory");
            Ok(Stores::from_shared(Arc::new(MockStore::new())))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(path = %config.sqlite.path, "Storage: sqlite");
            let store = SqliteStore::connect(&config.sqlite).await?;
            store.init().await?;
            Ok(Stores::from_shared(Arc::new(store)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::Unavailable(
                "sqlite feature not enabled".to_string(),
            ))
        }
    }
}
