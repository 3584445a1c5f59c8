use super::*;
use crate::model::TreeNode;
use crate::storage::MockStore;

async fn rooted(limit: u32) -> (Arc<MockStore>, TreeNode) {
    let store = Arc::new(MockStore::new());
    let root = store.insert_root(AgentId::new(), limit).await.unwrap();
    (store, root)
}

#[tokio::test]
async fn test_clean_partition() {
    let (store, root) = rooted(2).await;
    store
        .attach_child(2, root.agent_id, 1, AgentId::new())
        .await
        .unwrap();
    let reconciler = Reconciler::new(store);

    let report = reconciler.sweep(2).await.unwrap();

    assert_eq!(report.scanned, 2);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_restores_missing_pointer() {
    let (store, root) = rooted(2).await;
    let detached = TreeNode::child_of(AgentId::new(), &root, 2);
    store.insert_detached(detached.clone()).await;
    let reconciler = Reconciler::new(store.clone());

    let report = reconciler.sweep(2).await.unwrap();

    assert_eq!(report.repaired, vec![detached.agent_id]);
    assert!(report.flagged.is_empty());
    let parent = store.find_node(root.agent_id, 2).await.unwrap().unwrap();
    assert_eq!(parent.child(2), Some(detached.agent_id));

    let partition = Partition::new(2, store.load_partition(2).await.unwrap());
    assert!(partition.check_invariants().is_empty());
}

#[tokio::test]
async fn test_flags_collision() {
    let (store, root) = rooted(2).await;
    let winner = store
        .attach_child(2, root.agent_id, 1, AgentId::new())
        .await
        .unwrap();
    let loser = TreeNode::child_of(AgentId::new(), &root, 1);
    store.insert_detached(loser.clone()).await;
    let reconciler = Reconciler::new(store.clone());

    let report = reconciler.sweep(2).await.unwrap();

    assert!(report.repaired.is_empty());
    assert_eq!(
        report.flagged,
        vec![FlaggedNode {
            agent_id: loser.agent_id,
            parent_id: root.agent_id,
            slot: Some(1),
            occupant: Some(winner.agent_id),
        }]
    );
}

#[tokio::test]
async fn test_flags_missing_parent() {
    let (store, root) = rooted(2).await;
    let ghost_parent = TreeNode::child_of(AgentId::new(), &root, 1);
    let stray = TreeNode::child_of(AgentId::new(), &ghost_parent, 1);
    store.insert_detached(stray.clone()).await;
    let reconciler = Reconciler::new(store);

    let report = reconciler.sweep(2).await.unwrap();

    assert_eq!(report.flagged.len(), 1);
    assert_eq!(report.flagged[0].agent_id, stray.agent_id);
    assert_eq!(report.flagged[0].parent_id, ghost_parent.agent_id);
}

#[tokio::test]
async fn test_empty_partition() {
    let store = Arc::new(MockStore::new());
    let reconciler = Reconciler::new(store);

    let report = reconciler.sweep(3).await.unwrap();

    assert_eq!(report, ReconcileReport::default());
}
