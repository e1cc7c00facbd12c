//! Tests for `DurabilityPolicy`.

use crate::policy::DurabilityPolicy;
use crate::types::{DurabilityHint, StorageKind};

#[test]
fn max_survivability_persists_everything_atomically() {
  let p = DurabilityPolicy::new(DurabilityHint::MaxSurvivability);
  assert_eq!(p.storage_kind(), StorageKind::Immediate);
  assert!(p.checkpoint_every_suspension());
  assert!(p.atomic_writes());
  assert!(p.survives_dirty_kill());
}

#[test]
fn nonatomic_still_survives_dirty_kill() {
  let p = DurabilityPolicy::from(DurabilityHint::SurvivableNonatomic);
  assert_eq!(p.storage_kind(), StorageKind::Immediate);
  assert!(!p.atomic_writes());
  assert!(p.survives_dirty_kill());
}

#[test]
fn performance_optimized_batches() {
  let p = DurabilityPolicy::new(DurabilityHint::PerformanceOptimized);
  assert_eq!(p.storage_kind(), StorageKind::Batched);
  assert!(!p.checkpoint_every_suspension());
  assert!(!p.survives_dirty_kill());
}

#[tokio::test]
async fn open_storage_matches_kind() {
  let dir = tempfile::tempdir().unwrap();
  for hint in DurabilityHint::ALL {
    let policy = DurabilityPolicy::new(hint);
    let storage = policy.open_storage(dir.path()).await.unwrap();
    assert_eq!(storage.kind(), policy.storage_kind());
    assert!(storage.is_persisted_fully());
  }
}
