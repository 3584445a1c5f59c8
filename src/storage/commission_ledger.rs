//! CommissionLedger trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{AgentId, Commission, NewCommission, PaymentId};

/// Append-only commission ledger shared by both engines.
///
/// `(payment_id, agent_id, level)` is unique for entries that carry a
/// payment id.
#[async_trait]
pub trait CommissionLedger: Send + Sync {
    /// Append a batch all-or-nothing.
    ///
    /// Fails with `Duplicate` (and writes nothing) if any entry collides
    /// with an existing `(payment_id, agent_id, level)`.
    async fn append_batch(&self, batch: Vec<NewCommission>) -> Result<Vec<Commission>>;

    async fn list_for_agent(&self, agent_id: AgentId) -> Result<Vec<Commission>>;

    /// Entries for one payment, ordered by level.
    async fn list_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Commission>>;

    /// Whether sponsor-chain entries (level >= 1) exist for the payment.
    async fn has_chain_commissions(&self, payment_id: PaymentId) -> Result<bool>;
}
