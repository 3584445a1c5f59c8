use super::*;
use crate::model::CommissionStatus;

fn payout(agent_id: AgentId, level: u32) -> NewCommission {
    NewCommission {
        agent_id,
        from_agent_id: AgentId::new(),
        plan_id: PlanId::new(),
        commission_amount: Decimal::new(1_000, 2),
        original_amount: Decimal::new(10_000, 2),
        level,
        status: CommissionStatus::Paid,
        payment_id: Some(PaymentId::new()),
    }
}

#[tokio::test]
async fn test_fail_on_attach() {
    let store = MockStore::new();
    let root = store.insert_root(AgentId::new(), 2).await.unwrap();
    store.set_fail_on_attach(true).await;

    let result = store.attach_child(2, root.agent_id, 1, AgentId::new()).await;
    assert!(matches!(result, Err(StorageError::Unavailable(_))));

    store.set_fail_on_attach(false).await;
    store
        .attach_child(2, root.agent_id, 1, AgentId::new())
        .await
        .expect("attach should succeed once the failure is cleared");
}

fn pairing(reward: &PlanReward) -> PairingEvent {
    PairingEvent {
        parent_id: reward.agent_id,
        plan_id: reward.plan_id,
        from_agent_id: AgentId::new(),
        payment_id: Some(PaymentId::new()),
    }
}

#[tokio::test]
async fn test_fail_on_append_covers_pairing_payout() {
    let store = MockStore::new();
    let agent = AgentId::new();
    let reward = PlanReward::new(agent, PlanId::new(), 1, Decimal::new(5, 0));
    store.create_reward(&reward).await.unwrap();
    store.set_fail_on_append(true).await;

    let append = store.append_batch(vec![payout(agent, 1)]).await;
    let credit = store.credit_pairing(pairing(&reward), Utc::now()).await;

    assert!(matches!(append, Err(StorageError::Unavailable(_))));
    assert!(matches!(credit, Err(StorageError::Unavailable(_))));
    assert!(store.all_commissions().await.is_empty());
    let stored = store.get_reward(reward.id).await.unwrap().unwrap();
    assert_eq!(stored.pairing_completed, 0);
    assert!(!stored.is_released);
}

#[tokio::test]
async fn test_fail_on_append_spares_progress() {
    let store = MockStore::new();
    let reward = PlanReward::new(AgentId::new(), PlanId::new(), 2, Decimal::new(5, 0));
    store.create_reward(&reward).await.unwrap();
    store.set_fail_on_append(true).await;

    let credit = store
        .credit_pairing(pairing(&reward), Utc::now())
        .await
        .unwrap()
        .unwrap();

    assert!(credit.counted);
    assert_eq!(credit.reward.pairing_completed, 1);
    assert!(credit.payout.is_none());
}

#[tokio::test]
async fn test_insert_detached_leaves_parent_untouched() {
    let store = MockStore::new();
    let root = store.insert_root(AgentId::new(), 2).await.unwrap();
    let detached = TreeNode::child_of(AgentId::new(), &root, 1);

    store.insert_detached(detached.clone()).await;

    let parent = store.find_node(root.agent_id, 2).await.unwrap().unwrap();
    assert_eq!(parent.child(1), None);
    assert_eq!(store.find_node(detached.agent_id, 2).await.unwrap(), Some(detached.clone()));

    // The detached node's claim still blocks the slot.
    let result = store.attach_child(2, root.agent_id, 1, AgentId::new()).await;
    assert!(matches!(result, Err(StorageError::SlotTaken { slot: 1, .. })));
}

#[tokio::test]
async fn test_pairing_payout_uses_bonus_level() {
    let store = MockStore::new();
    let agent = AgentId::new();
    let reward = PlanReward::new(agent, PlanId::new(), 1, Decimal::new(5, 0));
    store.create_reward(&reward).await.unwrap();

    let credit = store
        .credit_pairing(pairing(&reward), Utc::now())
        .await
        .unwrap()
        .unwrap();

    let paid = credit.payout.expect("limit of one releases on the first credit");
    assert_eq!(paid.level, PAIRING_BONUS_LEVEL);
    assert_eq!(paid.commission_amount, Decimal::new(5, 0));
    assert_eq!(paid.original_amount, Decimal::new(5, 0));
    assert_eq!(store.all_commissions().await, vec![paid]);
}

#[tokio::test]
async fn test_batch_with_internal_duplicate_rejected() {
    let store = MockStore::new();
    let agent = AgentId::new();
    let entry = payout(agent, 1);

    let result = store.append_batch(vec![entry.clone(), entry]).await;

    assert!(matches!(result, Err(StorageError::Duplicate(_))));
    assert!(store.all_commissions().await.is_empty());
}
