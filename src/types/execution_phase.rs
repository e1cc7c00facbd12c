//! Lifecycle state of an execution.

use std::fmt;

use super::RunResult;

/// Lifecycle state of an execution controller.
///
/// `Complete` carries [RunResult::Success] or [RunResult::Failure], never `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
  Running,
  Pausing,
  Paused,
  Resuming,
  Complete(RunResult),
}

impl ExecutionPhase {
  pub fn is_complete(self) -> bool {
    matches!(self, ExecutionPhase::Complete(_))
  }

  /// True while appends must wait (pause requested or in effect).
  pub fn blocks_appends(self) -> bool {
    matches!(self, ExecutionPhase::Pausing | ExecutionPhase::Paused)
  }

  pub fn result(self) -> RunResult {
    match self {
      ExecutionPhase::Complete(r) => r,
      _ => RunResult::Pending,
    }
  }
}

impl fmt::Display for ExecutionPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutionPhase::Running => write!(f, "running"),
      ExecutionPhase::Pausing => write!(f, "pausing"),
      ExecutionPhase::Paused => write!(f, "paused"),
      ExecutionPhase::Resuming => write!(f, "resuming"),
      ExecutionPhase::Complete(r) => write!(f, "complete({})", r),
    }
  }
}
