//! Persisted top-level record of one execution (`execution.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CleanFlag, DurabilityHint, NodeId, RunResult};

/// Persisted lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
  Running,
  /// Paused deliberately; graph and program were fully flushed.
  Paused,
  /// Terminal. The record is archived and no longer mutated.
  Complete,
}

/// Top-level persisted entity of an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
  /// Record format version.
  pub version: u32,
  pub run_id: String,
  pub hint: DurabilityHint,
  /// Current heads in order.
  pub heads: Vec<NodeId>,
  pub clean: CleanFlag,
  pub status: RecordStatus,
  pub result: RunResult,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
  pub const VERSION: u32 = 1;

  pub fn new(run_id: impl Into<String>, hint: DurabilityHint) -> Self {
    let now = Utc::now();
    Self {
      version: Self::VERSION,
      run_id: run_id.into(),
      hint,
      heads: Vec::new(),
      clean: CleanFlag::Unknown,
      status: RecordStatus::Running,
      result: RunResult::Pending,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_complete(&self) -> bool {
    self.status == RecordStatus::Complete
  }

  pub fn is_paused(&self) -> bool {
    self.status == RecordStatus::Paused
  }

  pub(crate) fn touch(&mut self) {
    self.updated_at = Utc::now();
  }
}
