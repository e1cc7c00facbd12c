//! Durability hint selecting how aggressively a run is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which node storage strategy backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
  /// One durable write per node before `save` returns.
  Immediate,
  /// Nodes buffered in memory and written together on flush.
  Batched,
}

/// Policy value fixed for a run at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DurabilityHint {
  /// Every node and every suspension is written durably with atomic replace.
  #[default]
  MaxSurvivability,
  /// Like [DurabilityHint::MaxSurvivability] but files are overwritten in place.
  SurvivableNonatomic,
  /// Nodes are written in batches and the program only at safe points.
  PerformanceOptimized,
}

impl DurabilityHint {
  pub const ALL: [DurabilityHint; 3] = [
    DurabilityHint::MaxSurvivability,
    DurabilityHint::SurvivableNonatomic,
    DurabilityHint::PerformanceOptimized,
  ];

  /// Whether nodes and the continuation are persisted at every step.
  pub fn persist_with_every_step(self) -> bool {
    !matches!(self, DurabilityHint::PerformanceOptimized)
  }

  /// Whether on-disk units are replaced atomically.
  pub fn atomic_writes(self) -> bool {
    !matches!(self, DurabilityHint::SurvivableNonatomic)
  }

  /// Whether a run under this hint may resume after an uncontrolled termination.
  pub fn survives_dirty_kill(self) -> bool {
    self.persist_with_every_step()
  }

  pub fn storage_kind(self) -> StorageKind {
    if self.persist_with_every_step() {
      StorageKind::Immediate
    } else {
      StorageKind::Batched
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      DurabilityHint::MaxSurvivability => "max-survivability",
      DurabilityHint::SurvivableNonatomic => "survivable-nonatomic",
      DurabilityHint::PerformanceOptimized => "performance-optimized",
    }
  }
}

impl fmt::Display for DurabilityHint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DurabilityHint {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
    DurabilityHint::ALL
      .into_iter()
      .find(|h| h.as_str() == normalized)
      .ok_or_else(|| format!("unknown durability hint: {}", s))
  }
}
