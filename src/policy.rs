//! Durability policy: what a [DurabilityHint] means for storage and checkpoints.

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::storage::{BulkNodeStorage, NodeStorage, SimpleNodeStorage};
use crate::types::{DurabilityHint, StorageKind};

/// Resolved persistence policy of one run. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurabilityPolicy {
  hint: DurabilityHint,
}

impl DurabilityPolicy {
  pub fn new(hint: DurabilityHint) -> Self {
    Self { hint }
  }

  pub fn hint(&self) -> DurabilityHint {
    self.hint
  }

  pub fn storage_kind(&self) -> StorageKind {
    self.hint.storage_kind()
  }

  /// Whether the program continuation is written at every suspension, rather
  /// than only at safe points (pause, block completion, shutdown).
  pub fn checkpoint_every_suspension(&self) -> bool {
    self.hint.persist_with_every_step()
  }

  /// Whether record and program files are replaced atomically.
  pub fn atomic_writes(&self) -> bool {
    self.hint.atomic_writes()
  }

  /// Whether a run may resume after an uncontrolled termination. A paused run
  /// always may, whatever this returns.
  pub fn survives_dirty_kill(&self) -> bool {
    self.hint.survives_dirty_kill()
  }

  /// Builds the node storage backing a run stored in `run_dir`.
  pub async fn open_storage(&self, run_dir: &Path) -> Result<Box<dyn NodeStorage>> {
    debug!(hint = %self.hint, run_dir = %run_dir.display(), "opening node storage");
    Ok(match self.storage_kind() {
      StorageKind::Immediate => Box::new(SimpleNodeStorage::new(run_dir, self.atomic_writes())),
      StorageKind::Batched => Box::new(BulkNodeStorage::open(run_dir).await?),
    })
  }
}

impl From<DurabilityHint> for DurabilityPolicy {
  fn from(hint: DurabilityHint) -> Self {
    Self::new(hint)
  }
}
