//! Tests for `DurabilityHint`.

use super::{DurabilityHint, StorageKind};

#[test]
fn max_survivability_is_immediate_and_atomic() {
  let h = DurabilityHint::MaxSurvivability;
  assert!(h.persist_with_every_step());
  assert!(h.atomic_writes());
  assert!(h.survives_dirty_kill());
  assert_eq!(h.storage_kind(), StorageKind::Immediate);
}

#[test]
fn performance_optimized_is_batched() {
  let h = DurabilityHint::PerformanceOptimized;
  assert!(!h.persist_with_every_step());
  assert!(h.atomic_writes());
  assert!(!h.survives_dirty_kill());
  assert_eq!(h.storage_kind(), StorageKind::Batched);
}

#[test]
fn survivable_nonatomic_skips_atomic_replace() {
  let h = DurabilityHint::SurvivableNonatomic;
  assert!(h.persist_with_every_step());
  assert!(!h.atomic_writes());
  assert_eq!(h.storage_kind(), StorageKind::Immediate);
}

#[test]
fn default_is_max_survivability() {
  assert_eq!(DurabilityHint::default(), DurabilityHint::MaxSurvivability);
}

#[test]
fn parse_accepts_kebab_and_screaming_snake() {
  assert_eq!(
    "performance-optimized".parse::<DurabilityHint>().unwrap(),
    DurabilityHint::PerformanceOptimized
  );
  assert_eq!(
    "MAX_SURVIVABILITY".parse::<DurabilityHint>().unwrap(),
    DurabilityHint::MaxSurvivability
  );
  assert!("fast".parse::<DurabilityHint>().is_err());
}

#[test]
fn display_matches_serde_name() {
  for hint in DurabilityHint::ALL {
    let json = serde_json::to_string(&hint).unwrap();
    assert_eq!(json, format!("\"{}\"", hint));
  }
}
