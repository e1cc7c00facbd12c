//! Tests for `BulkNodeStorage`.

use super::{BULK_NODES_FILENAME, BulkNodeStorage, NodeStorage};
use crate::types::{FlowNode, NodeId, NodeKind};

fn node(id: u64) -> FlowNode {
  let parents = if id == 1 {
    vec![]
  } else {
    vec![NodeId::new(id - 1)]
  };
  let kind = if id == 1 {
    NodeKind::FlowStart
  } else {
    NodeKind::Atom
  };
  FlowNode::new(NodeId::new(id), kind, "step", parents)
}

#[tokio::test]
async fn save_buffers_until_flush() {
  let dir = tempfile::tempdir().unwrap();
  let mut storage = BulkNodeStorage::open(dir.path()).await.unwrap();
  storage.save(&node(1)).await.unwrap();
  storage.save(&node(2)).await.unwrap();
  assert!(!storage.is_persisted_fully());
  assert_eq!(storage.unflushed(), 2);
  assert!(!dir.path().join(BULK_NODES_FILENAME).exists());
  // still readable from memory
  assert_eq!(storage.load(NodeId::new(2)).await.unwrap().id(), NodeId::new(2));

  storage.flush().await.unwrap();
  assert!(storage.is_persisted_fully());
  assert!(dir.path().join(BULK_NODES_FILENAME).exists());
}

#[tokio::test]
async fn unflushed_nodes_are_lost_on_reopen() {
  let dir = tempfile::tempdir().unwrap();
  {
    let mut storage = BulkNodeStorage::open(dir.path()).await.unwrap();
    storage.save(&node(1)).await.unwrap();
    storage.flush().await.unwrap();
    storage.save(&node(2)).await.unwrap();
    // dropped without flush: simulated hard kill
  }
  let reopened = BulkNodeStorage::open(dir.path()).await.unwrap();
  let loaded = reopened.load_all().await.unwrap();
  let ids: Vec<u64> = loaded.nodes.iter().map(|n| n.id().value()).collect();
  assert_eq!(ids, vec![1]);
  assert!(reopened.is_persisted_fully());
}

#[tokio::test]
async fn flush_writes_whole_list_as_one_unit() {
  let dir = tempfile::tempdir().unwrap();
  let mut storage = BulkNodeStorage::open(dir.path()).await.unwrap();
  for id in 1..=4 {
    storage.save(&node(id)).await.unwrap();
  }
  storage.flush().await.unwrap();
  let raw = std::fs::read(dir.path().join(BULK_NODES_FILENAME)).unwrap();
  let list: Vec<FlowNode> = serde_json::from_slice(&raw).unwrap();
  assert_eq!(list.len(), 4);
}

#[tokio::test]
async fn corrupt_list_opens_empty_and_reports() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join(BULK_NODES_FILENAME), b"[{").unwrap();
  let storage = BulkNodeStorage::open(dir.path()).await.unwrap();
  let loaded = storage.load_all().await.unwrap();
  assert!(loaded.nodes.is_empty());
  assert_eq!(loaded.failures.len(), 1);
}
