//! Referral Engine - MLM placement and commission core
//!
//! Places agents into bounded-fanout referral trees (one per pairing limit),
//! releases pairing bonuses as nodes fill up, and pays the linear sponsor
//! chain a waterfall of commissions on every purchase.
//!
//! Everything is invoked in-process. Persistence sits behind the traits in
//! [`storage`], with in-memory and SQLite implementations.

pub mod commission;
pub mod config;
pub mod model;
pub mod placement;
pub mod rewards;
pub mod services;
pub mod storage;
pub mod utils;

pub use commission::{CommissionEngine, CommissionError, CommissionRequest, CommissionSummary};
pub use config::Config;
pub use placement::{find_target, Placement, PlacementEngine, PlacementError, PlacementTarget};
pub use rewards::{PairingOutcome, PairingTracker};
pub use services::{PurchaseEvent, PurchaseOutcome, PurchaseProcessor, Reconciler};
pub use storage::{init_storage, StorageError, Stores};
