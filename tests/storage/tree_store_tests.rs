//! TreeStore interface tests.
//!
//! Every test owns a distinct pairing limit, since a partition holds one root.

use std::sync::Arc;

use referral_engine::model::{AgentId, Partition, Position, TreeNode};
use referral_engine::storage::{StorageError, TreeStore};

// =============================================================================
// Root tests
// =============================================================================

/// Uses pairing limit 2.
pub async fn test_insert_root<S: TreeStore>(store: &S) {
    let agent = AgentId::new();

    let root = store.insert_root(agent, 2).await.expect("root insert should succeed");

    assert_eq!(root.position, Position::Root);
    assert_eq!(root.level, 1);
    assert!(root.parent_id.is_none());
    assert_eq!(root.children, vec![None, None]);
    assert_eq!(store.find_node(agent, 2).await.unwrap(), Some(root));
    assert!(store.find_node(agent, 3).await.unwrap().is_none());
}

/// Uses pairing limit 3.
pub async fn test_single_root_per_partition<S: TreeStore>(store: &S) {
    let first = AgentId::new();
    store.insert_root(first, 3).await.unwrap();

    let second = store.insert_root(AgentId::new(), 3).await;
    assert!(
        matches!(second, Err(StorageError::RootExists { pairing_limit: 3 })),
        "{second:?}"
    );

    let again = store.insert_root(first, 3).await;
    assert!(
        matches!(again, Err(StorageError::AlreadyPlaced { .. })),
        "{again:?}"
    );
}

pub async fn test_zero_pairing_limit_rejected<S: TreeStore>(store: &S) {
    let result = store.insert_root(AgentId::new(), 0).await;
    assert!(matches!(result, Err(StorageError::InvalidPairingLimit)));
}

// =============================================================================
// attach_child tests
// =============================================================================

/// Uses pairing limit 4.
pub async fn test_attach_child_updates_both_sides<S: TreeStore>(store: &S) {
    let root = store.insert_root(AgentId::new(), 4).await.unwrap();
    let agent = AgentId::new();

    let child = store
        .attach_child(4, root.agent_id, 3, agent)
        .await
        .expect("attach should succeed");

    assert_eq!(child.parent_id, Some(root.agent_id));
    assert_eq!(child.position, Position::Child(3));
    assert_eq!(child.level, 2);
    assert_eq!(child.children.len(), 4);

    let parent = store.find_node(root.agent_id, 4).await.unwrap().unwrap();
    assert_eq!(parent.child(3), Some(agent));
    assert_eq!(parent.first_open_slot(), Some(1));
}

/// Uses pairing limit 5.
pub async fn test_attach_rejects_conflicts<S: TreeStore>(store: &S) {
    let root = store.insert_root(AgentId::new(), 5).await.unwrap();
    let placed = AgentId::new();
    store.attach_child(5, root.agent_id, 1, placed).await.unwrap();

    let taken = store.attach_child(5, root.agent_id, 1, AgentId::new()).await;
    assert!(
        matches!(taken, Err(StorageError::SlotTaken { slot: 1, .. })),
        "{taken:?}"
    );

    let twice = store.attach_child(5, root.agent_id, 2, placed).await;
    assert!(
        matches!(twice, Err(StorageError::AlreadyPlaced { .. })),
        "{twice:?}"
    );

    let out_of_range = store.attach_child(5, root.agent_id, 6, AgentId::new()).await;
    assert!(
        matches!(out_of_range, Err(StorageError::InvalidSlot { slot: 6, pairing_limit: 5 })),
        "{out_of_range:?}"
    );

    let orphan_parent = store.attach_child(5, AgentId::new(), 1, AgentId::new()).await;
    assert!(
        matches!(orphan_parent, Err(StorageError::NotFound { .. })),
        "{orphan_parent:?}"
    );
}

/// Uses pairing limit 6.
pub async fn test_load_partition<S: TreeStore>(store: &S) {
    let root = store.insert_root(AgentId::new(), 6).await.unwrap();
    let a = store.attach_child(6, root.agent_id, 1, AgentId::new()).await.unwrap();
    let b = store.attach_child(6, root.agent_id, 2, AgentId::new()).await.unwrap();
    let c = store.attach_child(6, a.agent_id, 1, AgentId::new()).await.unwrap();

    let nodes = store.load_partition(6).await.unwrap();
    let partition = Partition::new(6, nodes);

    assert_eq!(partition.len(), 4);
    assert!(partition.check_invariants().is_empty());
    assert_eq!(partition.root().map(|n| n.agent_id), Some(root.agent_id));
    assert_eq!(partition.node(&c.agent_id).map(|n| n.level), Some(3));
    let downline: Vec<AgentId> = partition
        .downline(&root.agent_id, None)
        .iter()
        .map(|e| e.agent_id)
        .collect();
    assert_eq!(downline, vec![a.agent_id, b.agent_id, c.agent_id]);

    assert!(store.load_partition(99).await.unwrap().is_empty());
}

/// Uses pairing limits 7 and 8.
pub async fn test_agent_in_multiple_partitions<S: TreeStore>(store: &S) {
    let agent = AgentId::new();
    let root7 = store.insert_root(agent, 7).await.unwrap();
    // The same agent may also sit as a child in another partition.
    let other_root = store.insert_root(AgentId::new(), 8).await.unwrap();
    let child8 = store.attach_child(8, other_root.agent_id, 1, agent).await.unwrap();

    assert_eq!(store.find_node(agent, 7).await.unwrap(), Some(root7));
    assert_eq!(store.find_node(agent, 8).await.unwrap().map(|n| n.level), Some(child8.level));
}

// =============================================================================
// set_slot tests
// =============================================================================

/// Uses pairing limit 9.
pub async fn test_set_slot<S: TreeStore>(store: &S) {
    let root = store.insert_root(AgentId::new(), 9).await.unwrap();
    let a = store.attach_child(9, root.agent_id, 1, AgentId::new()).await.unwrap();

    store
        .set_slot(9, root.agent_id, 1, a.agent_id)
        .await
        .expect("setting an identical pointer is a no-op");

    let conflict = store.set_slot(9, root.agent_id, 1, root.agent_id).await;
    assert!(matches!(conflict, Err(StorageError::SlotTaken { .. })), "{conflict:?}");

    let missing = store.set_slot(9, root.agent_id, 2, AgentId::new()).await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })), "{missing:?}");
}

// =============================================================================
// Concurrency tests
// =============================================================================

/// Uses pairing limit 10.
pub async fn test_concurrent_attach_one_winner<S: TreeStore + 'static>(store: Arc<S>) {
    let root = store.insert_root(AgentId::new(), 10).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let parent = root.agent_id;
            tokio::spawn(async move { store.attach_child(10, parent, 1, AgentId::new()).await })
        })
        .collect();

    let mut winners = Vec::<TreeNode>::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(node) => winners.push(node),
            Err(StorageError::SlotTaken { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one attach may claim the slot");
    let parent = store.find_node(root.agent_id, 10).await.unwrap().unwrap();
    assert_eq!(parent.child(1), Some(winners[0].agent_id));
    assert_eq!(store.load_partition(10).await.unwrap().len(), 2);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all TreeStore interface tests against a store implementation.
///
/// Takes an `Arc` of the store.
#[macro_export]
macro_rules! run_tree_store_tests {
    ($store:expr) => {
        use $crate::storage::tree_store_tests::*;

        test_insert_root(&*$store).await;
        println!("  test_insert_root: PASSED");

        test_single_root_per_partition(&*$store).await;
        println!("  test_single_root_per_partition: PASSED");

        test_zero_pairing_limit_rejected(&*$store).await;
        println!("  test_zero_pairing_limit_rejected: PASSED");

        test_attach_child_updates_both_sides(&*$store).await;
        println!("  test_attach_child_updates_both_sides: PASSED");

        test_attach_rejects_conflicts(&*$store).await;
        println!("  test_attach_rejects_conflicts: PASSED");

        test_load_partition(&*$store).await;
        println!("  test_load_partition: PASSED");

        test_agent_in_multiple_partitions(&*$store).await;
        println!("  test_agent_in_multiple_partitions: PASSED");

        test_set_slot(&*$store).await;
        println!("  test_set_slot: PASSED");

        test_concurrent_attach_one_winner($store.clone()).await;
        println!("  test_concurrent_attach_one_winner: PASSED");
    };
}
