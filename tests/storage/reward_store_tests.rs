//! RewardStore interface tests.

use std::sync::Arc;

use chrono::Utc;
use referral_engine::model::{AgentId, PairingEvent, PaymentId, PlanId, PlanReward, PAIRING_BONUS_LEVEL};
use referral_engine::storage::{CommissionLedger, RewardStore, StorageError};
use rust_decimal::Decimal;

fn child_of(reward: &PlanReward, payment_id: Option<PaymentId>) -> PairingEvent {
    PairingEvent {
        parent_id: reward.agent_id,
        plan_id: reward.plan_id,
        from_agent_id: AgentId::new(),
        payment_id,
    }
}

// =============================================================================
// create / get tests
// =============================================================================

pub async fn test_create_and_get<S: RewardStore>(store: &S) {
    let reward = PlanReward::new(AgentId::new(), PlanId::new(), 2, Decimal::new(5_000, 2));

    store.create_reward(&reward).await.expect("create should succeed");

    assert_eq!(store.get_reward(reward.id).await.unwrap(), Some(reward.clone()));
    assert_eq!(
        store.find_unreleased(reward.agent_id, reward.plan_id).await.unwrap(),
        Some(reward.clone())
    );
    assert_eq!(store.list_rewards(reward.agent_id).await.unwrap(), vec![reward]);
}

pub async fn test_one_open_reward_per_plan<S: RewardStore>(store: &S) {
    let agent = AgentId::new();
    let plan = PlanId::new();
    store
        .create_reward(&PlanReward::new(agent, plan, 2, Decimal::new(10, 0)))
        .await
        .unwrap();

    let second = store
        .create_reward(&PlanReward::new(agent, plan, 2, Decimal::new(10, 0)))
        .await;
    assert!(matches!(second, Err(StorageError::Duplicate(_))), "{second:?}");

    store
        .create_reward(&PlanReward::new(agent, PlanId::new(), 2, Decimal::new(10, 0)))
        .await
        .expect("another plan is a separate entitlement");
}

// =============================================================================
// credit_pairing tests
// =============================================================================

pub async fn test_credit_untracked<S: RewardStore>(store: &S) {
    let event = PairingEvent {
        parent_id: AgentId::new(),
        plan_id: PlanId::new(),
        from_agent_id: AgentId::new(),
        payment_id: None,
    };
    let result = store.credit_pairing(event, Utc::now()).await.unwrap();
    assert!(result.is_none());
}

pub async fn test_credit_and_release<S: RewardStore + CommissionLedger>(store: &S) {
    let reward = PlanReward::new(AgentId::new(), PlanId::new(), 2, Decimal::new(12_345, 2));
    store.create_reward(&reward).await.unwrap();

    let first_child = child_of(&reward, None);
    let first = store
        .credit_pairing(first_child, Utc::now())
        .await
        .unwrap()
        .expect("open reward should be credited");
    assert!(first.counted);
    assert_eq!(first.reward.pairing_completed, 1);
    assert!(first.payout.is_none(), "below threshold must not pay");

    let repeat = store
        .credit_pairing(first_child, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(!repeat.counted, "a child counts once per reward");
    assert_eq!(repeat.reward.pairing_completed, 1);

    let payment = PaymentId::new();
    let second = store
        .credit_pairing(child_of(&reward, Some(payment)), Utc::now())
        .await
        .unwrap()
        .unwrap();
    let paid = second.payout.expect("threshold reached, credit should pay");
    assert_eq!(paid.level, PAIRING_BONUS_LEVEL);
    assert_eq!(paid.commission_amount, Decimal::new(12_345, 2));
    assert!(second.reward.is_released);

    let stored = store.get_reward(reward.id).await.unwrap().unwrap();
    assert_eq!(stored.pairing_completed, 2);
    assert!(stored.is_released);
    assert!(stored.released_at.is_some());
    assert!(store.find_unreleased(reward.agent_id, reward.plan_id).await.unwrap().is_none());

    let after = store
        .credit_pairing(child_of(&reward, None), Utc::now())
        .await
        .unwrap();
    assert!(after.is_none(), "released reward is terminal");

    let ledger = store.list_for_agent(reward.agent_id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].payment_id, Some(payment));
}

pub async fn test_released_reward_frees_entitlement<S: RewardStore>(store: &S) {
    let reward = PlanReward::new(AgentId::new(), PlanId::new(), 1, Decimal::new(100, 0));
    store.create_reward(&reward).await.unwrap();
    store
        .credit_pairing(child_of(&reward, None), Utc::now())
        .await
        .unwrap();

    let next = PlanReward::new(reward.agent_id, reward.plan_id, 1, Decimal::new(100, 0));
    store
        .create_reward(&next)
        .await
        .expect("a released reward no longer blocks a new one");
    assert_eq!(store.list_rewards(reward.agent_id).await.unwrap().len(), 2);
}

pub async fn test_concurrent_credits_release_once<S: RewardStore + CommissionLedger + 'static>(
    store: Arc<S>,
) {
    let reward = PlanReward::new(AgentId::new(), PlanId::new(), 3, Decimal::new(900, 2));
    store.create_reward(&reward).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let event = child_of(&reward, None);
            tokio::spawn(async move { store.credit_pairing(event, Utc::now()).await })
        })
        .collect();

    let mut paid = 0;
    for handle in handles {
        if let Some(credit) = handle.await.unwrap().unwrap() {
            if credit.payout.is_some() {
                paid += 1;
            }
        }
    }

    assert_eq!(paid, 1);
    let stored = store.get_reward(reward.id).await.unwrap().unwrap();
    assert_eq!(stored.pairing_completed, 3);
    assert_eq!(store.list_for_agent(reward.agent_id).await.unwrap().len(), 1);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all RewardStore interface tests against a store implementation.
///
/// Takes an `Arc` of the store.
#[macro_export]
macro_rules! run_reward_store_tests {
    ($store:expr) => {
        use $crate::storage::reward_store_tests::*;

        test_create_and_get(&*$store).await;
        println!("  test_create_and_get: PASSED");

        test_one_open_reward_per_plan(&*$store).await;
        println!("  test_one_open_reward_per_plan: PASSED");

        test_credit_untracked(&*$store).await;
        println!("  test_credit_untracked: PASSED");

        test_credit_and_release(&*$store).await;
        println!("  test_credit_and_release: PASSED");

        test_released_reward_frees_entitlement(&*$store).await;
        println!("  test_released_reward_frees_entitlement: PASSED");

        test_concurrent_credits_release_once($store.clone()).await;
        println!("  test_concurrent_credits_release_once: PASSED");
    };
}
