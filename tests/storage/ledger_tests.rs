//! CommissionLedger interface tests.

use referral_engine::model::{AgentId, PaymentId, PlanId, PAIRING_BONUS_LEVEL};
use referral_engine::storage::{CommissionLedger, StorageError};
use rust_decimal::Decimal;

use super::commission;

pub async fn test_append_and_list<S: CommissionLedger>(store: &S) {
    let payment = PaymentId::new();
    let plan = PlanId::new();
    let near = AgentId::new();
    let far = AgentId::new();

    let inserted = store
        .append_batch(vec![
            commission(near, plan, 1, 10_000, Some(payment)),
            commission(far, plan, 2, 9_000, Some(payment)),
        ])
        .await
        .expect("append should succeed");
    assert_eq!(inserted.len(), 2);
    assert_ne!(inserted[0].id, inserted[1].id);

    let for_payment = store.list_for_payment(payment).await.unwrap();
    let levels: Vec<(AgentId, u32)> = for_payment.iter().map(|c| (c.agent_id, c.level)).collect();
    assert_eq!(levels, vec![(near, 1), (far, 2)]);

    let for_near = store.list_for_agent(near).await.unwrap();
    assert_eq!(for_near.len(), 1);
    assert_eq!(for_near[0].commission_amount, Decimal::new(10_000, 2));
    assert_eq!(for_near[0], inserted[0]);
}

pub async fn test_empty_batch<S: CommissionLedger>(store: &S) {
    let inserted = store.append_batch(Vec::new()).await.unwrap();
    assert!(inserted.is_empty());
}

pub async fn test_duplicate_batch_writes_nothing<S: CommissionLedger>(store: &S) {
    let payment = PaymentId::new();
    let plan = PlanId::new();
    let paid = AgentId::new();
    store
        .append_batch(vec![commission(paid, plan, 1, 500, Some(payment))])
        .await
        .unwrap();

    let fresh = AgentId::new();
    let result = store
        .append_batch(vec![
            commission(fresh, plan, 2, 450, Some(payment)),
            commission(paid, plan, 1, 500, Some(payment)),
        ])
        .await;

    assert!(matches!(result, Err(StorageError::Duplicate(_))), "{result:?}");
    assert!(
        store.list_for_agent(fresh).await.unwrap().is_empty(),
        "a rejected batch must not leave partial rows"
    );
    assert_eq!(store.list_for_payment(payment).await.unwrap().len(), 1);
}

pub async fn test_commissions_without_payment_not_deduplicated<S: CommissionLedger>(store: &S) {
    let agent = AgentId::new();
    let plan = PlanId::new();

    store.append_batch(vec![commission(agent, plan, 1, 100, None)]).await.unwrap();
    store.append_batch(vec![commission(agent, plan, 1, 100, None)]).await.unwrap();

    assert_eq!(store.list_for_agent(agent).await.unwrap().len(), 2);
}

pub async fn test_has_chain_commissions<S: CommissionLedger>(store: &S) {
    let payment = PaymentId::new();
    let agent = AgentId::new();
    let plan = PlanId::new();
    assert!(!store.has_chain_commissions(payment).await.unwrap());

    store
        .append_batch(vec![commission(agent, plan, PAIRING_BONUS_LEVEL, 2_500, Some(payment))])
        .await
        .unwrap();
    assert!(
        !store.has_chain_commissions(payment).await.unwrap(),
        "pairing bonuses are not chain commissions"
    );

    store
        .append_batch(vec![commission(AgentId::new(), plan, 1, 1_000, Some(payment))])
        .await
        .unwrap();
    assert!(store.has_chain_commissions(payment).await.unwrap());
}

/// Run all CommissionLedger interface tests against a store implementation.
#[macro_export]
macro_rules! run_ledger_tests {
    ($store:expr) => {
        use $crate::storage::ledger_tests::*;

        test_append_and_list($store).await;
        println!("  test_append_and_list: PASSED");

        test_empty_batch($store).await;
        println!("  test_empty_batch: PASSED");

        test_duplicate_batch_writes_nothing($store).await;
        println!("  test_duplicate_batch_writes_nothing: PASSED");

        test_commissions_without_payment_not_deduplicated($store).await;
        println!("  test_commissions_without_payment_not_deduplicated: PASSED");

        test_has_chain_commissions($store).await;
        println!("  test_has_chain_commissions: PASSED");
    };
}
