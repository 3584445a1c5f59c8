//! AgentDirectory, PlanCatalog and OwnershipRecord interface tests.

use referral_engine::model::{Agent, AgentId, ChainSettings, Plan, PlanId};
use referral_engine::storage::{AgentDirectory, OwnershipRecord, PlanCatalog, StorageError, TreeStore};
use rust_decimal::Decimal;

// =============================================================================
// AgentDirectory tests
// =============================================================================

pub async fn test_register_and_get<S: AgentDirectory>(store: &S) {
    let sponsor = AgentId::new();
    let agent = Agent::new(Some(sponsor), format!("dir-{}", AgentId::new()));

    store.register_agent(&agent).await.expect("register should succeed");

    let loaded = store
        .get_agent(agent.id)
        .await
        .expect("get should succeed")
        .expect("agent should exist");
    assert_eq!(loaded, agent);
    assert!(store.get_agent(AgentId::new()).await.unwrap().is_none());
}

pub async fn test_find_by_referral_code<S: AgentDirectory>(store: &S) {
    let code = format!("code-{}", AgentId::new());
    let agent = Agent::new(None, code.clone());
    store.register_agent(&agent).await.unwrap();

    let found = store.find_by_referral_code(&code).await.unwrap();
    assert_eq!(found.map(|a| a.id), Some(agent.id));
    assert!(store.find_by_referral_code("no-such-code").await.unwrap().is_none());
}

pub async fn test_duplicate_agent_rejected<S: AgentDirectory>(store: &S) {
    let agent = Agent::new(None, format!("dup-{}", AgentId::new()));
    store.register_agent(&agent).await.unwrap();

    let same_id = store.register_agent(&agent).await;
    assert!(matches!(same_id, Err(StorageError::Duplicate(_))), "{same_id:?}");

    let same_code = Agent::new(None, agent.referral_code.clone());
    let result = store.register_agent(&same_code).await;
    assert!(matches!(result, Err(StorageError::Duplicate(_))), "{result:?}");
}

pub async fn test_set_active<S: AgentDirectory>(store: &S) {
    let agent = Agent::new(None, format!("act-{}", AgentId::new()));
    store.register_agent(&agent).await.unwrap();

    store.set_active(agent.id, false).await.unwrap();
    assert!(!store.get_agent(agent.id).await.unwrap().unwrap().is_active);

    store.set_active(agent.id, true).await.unwrap();
    assert!(store.get_agent(agent.id).await.unwrap().unwrap().is_active);

    let missing = store.set_active(AgentId::new(), true).await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));
}

// =============================================================================
// PlanCatalog tests
// =============================================================================

pub async fn test_upsert_plan<S: PlanCatalog>(store: &S) {
    let plan = Plan::new("Silver", Decimal::new(49_999, 2)).with_pairing_bonus(Decimal::new(2_500, 2));
    store.upsert_plan(&plan).await.unwrap();
    assert_eq!(store.get_plan(plan.id).await.unwrap(), Some(plan.clone()));

    let renamed = Plan {
        name: "Silver Plus".to_string(),
        pairing_bonus: None,
        ..plan.clone()
    };
    store.upsert_plan(&renamed).await.unwrap();
    assert_eq!(store.get_plan(plan.id).await.unwrap(), Some(renamed));
    assert!(store.get_plan(PlanId::new()).await.unwrap().is_none());
}

pub async fn test_chain_settings<S: PlanCatalog>(store: &S) {
    let plan_id = PlanId::new();
    assert!(store.chain_settings(plan_id).await.unwrap().is_none());

    store
        .set_chain_settings(plan_id, ChainSettings::new(3, 7))
        .await
        .unwrap();
    assert_eq!(
        store.chain_settings(plan_id).await.unwrap(),
        Some(ChainSettings::new(3, 7))
    );

    store
        .set_chain_settings(plan_id, ChainSettings::new(3, 12))
        .await
        .unwrap();
    assert_eq!(store.chain_settings(plan_id).await.unwrap().map(|s| s.max_depth), Some(12));

    let zero = store.set_chain_settings(plan_id, ChainSettings::new(0, 5)).await;
    assert!(matches!(zero, Err(StorageError::InvalidPairingLimit)));
}

/// Uses pairing limit 41.
pub async fn test_pairing_limit_locked<S: PlanCatalog + TreeStore>(store: &S) {
    let plan_id = PlanId::new();
    store
        .set_chain_settings(plan_id, ChainSettings::new(41, 10))
        .await
        .unwrap();
    store.insert_root(AgentId::new(), 41).await.unwrap();

    let result = store
        .set_chain_settings(plan_id, ChainSettings::new(42, 10))
        .await;
    assert!(
        matches!(
            result,
            Err(StorageError::PairingLimitLocked {
                current: 41,
                requested: 42,
                ..
            })
        ),
        "{result:?}"
    );

    // Depth may still change.
    store
        .set_chain_settings(plan_id, ChainSettings::new(41, 20))
        .await
        .unwrap();
}

pub async fn test_commission_rate<S: PlanCatalog>(store: &S) {
    store.set_commission_rate(Decimal::new(75, 1)).await.unwrap();
    assert_eq!(store.commission_rate().await.unwrap(), Some(Decimal::new(75, 1)));

    store.set_commission_rate(Decimal::new(10, 0)).await.unwrap();
    assert_eq!(store.commission_rate().await.unwrap(), Some(Decimal::new(10, 0)));
}

// =============================================================================
// OwnershipRecord tests
// =============================================================================

pub async fn test_ownership<S: OwnershipRecord>(store: &S) {
    let agent = AgentId::new();
    let plan = PlanId::new();
    assert!(!store.owns_plan(agent, plan).await.unwrap());

    store.record_ownership(agent, plan, None).await.unwrap();
    store
        .record_ownership(agent, plan, None)
        .await
        .expect("recording twice should be a no-op");

    assert!(store.owns_plan(agent, plan).await.unwrap());
    assert!(!store.owns_plan(agent, PlanId::new()).await.unwrap());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all directory interface tests against a store implementation.
#[macro_export]
macro_rules! run_directory_tests {
    ($store:expr) => {
        use $crate::storage::directory_tests::*;

        test_register_and_get($store).await;
        println!("  test_register_and_get: PASSED");

        test_find_by_referral_code($store).await;
        println!("  test_find_by_referral_code: PASSED");

        test_duplicate_agent_rejected($store).await;
        println!("  test_duplicate_agent_rejected: PASSED");

        test_set_active($store).await;
        println!("  test_set_active: PASSED");

        test_upsert_plan($store).await;
        println!("  test_upsert_plan: PASSED");

        test_chain_settings($store).await;
        println!("  test_chain_settings: PASSED");

        test_pairing_limit_locked($store).await;
        println!("  test_pairing_limit_locked: PASSED");

        test_commission_rate($store).await;
        println!("  test_commission_rate: PASSED");

        test_ownership($store).await;
        println!("  test_ownership: PASSED");
    };
}
