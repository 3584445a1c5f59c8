//! Shared storage integration tests.
//!
//! Tests every storage trait against all implementations. Each backend test
//! file imports these functions through the `run_*_tests!` macros.
//!
//! The tests share one store per run, so every test uses fresh ids and its
//! own pairing limit.

pub mod directory_tests;
pub mod ledger_tests;
pub mod reward_store_tests;
pub mod tree_store_tests;

use referral_engine::model::{CommissionStatus, NewCommission};
use referral_engine::model::{AgentId, PaymentId, PlanId};
use rust_decimal::Decimal;

pub fn commission(
    agent_id: AgentId,
    plan_id: PlanId,
    level: u32,
    amount: i64,
    payment_id: Option<PaymentId>,
) -> NewCommission {
    NewCommission {
        agent_id,
        from_agent_id: AgentId::new(),
        plan_id,
        commission_amount: Decimal::new(amount, 2),
        original_amount: Decimal::new(100_000, 2),
        level,
        status: CommissionStatus::Paid,
        payment_id,
    }
}
