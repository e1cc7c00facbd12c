//! Error type for graph, storage, controller and recovery operations.

use crate::types::{ExecutionPhase, NodeId};

/// Unified error for durability operations.
#[derive(Debug, thiserror::Error)]
pub enum DurabilityError {
  /// A save or flush did not complete. The clean flag stays dirty.
  #[error("storage write failed: {0}")]
  StorageWrite(String),
  /// A referenced node does not exist. Never expected in an uncorrupted graph.
  #[error("flow node {0} not found")]
  NotFound(NodeId),
  /// Structural violation: bad parents, unmatched block end, second start or end.
  #[error("graph integrity failure: {0}")]
  GraphIntegrity(String),
  /// Recovery decided the run cannot continue.
  #[error("execution {run_id} cannot be resumed: {reason}")]
  Unresumable { run_id: String, reason: String },
  /// The continuation blob could not be decoded or reconciled with the graph.
  #[error("continuation could not be restored: {0}")]
  ContinuationDecode(String),
  /// The operation is not allowed in the current phase (e.g. appending after completion).
  #[error("operation not allowed while execution is {phase}: {operation}")]
  InvalidState {
    phase: ExecutionPhase,
    operation: &'static str,
  },
  #[error("invalid configuration: {0}")]
  Config(String),
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl DurabilityError {
  pub(crate) fn integrity(message: impl Into<String>) -> Self {
    DurabilityError::GraphIntegrity(message.into())
  }

  /// True for failures that mean the graph itself can no longer be trusted.
  pub fn is_integrity_failure(&self) -> bool {
    matches!(
      self,
      DurabilityError::NotFound(_) | DurabilityError::GraphIntegrity(_)
    )
  }
}

pub type Result<T> = std::result::Result<T, DurabilityError>;
