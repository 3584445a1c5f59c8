//! Workflows built on top of the engines.

pub mod purchase;
pub mod reconcile;

pub use purchase::{PurchaseEvent, PurchaseOutcome, PurchaseProcessor};
pub use reconcile::{FlaggedNode, ReconcileReport, Reconciler};
