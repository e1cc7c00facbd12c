//! Run results and step outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a run as reported to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
  Success,
  Failure,
  /// The run has not completed.
  #[default]
  Pending,
}

impl fmt::Display for RunResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunResult::Success => write!(f, "success"),
      RunResult::Failure => write!(f, "failure"),
      RunResult::Pending => write!(f, "pending"),
    }
  }
}

/// Outcome of the workflow program reported by the interpreter when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
  Ok,
  Error(String),
}

impl StepOutcome {
  pub fn error(reason: impl Into<String>) -> Self {
    StepOutcome::Error(reason.into())
  }

  pub fn run_result(&self) -> RunResult {
    match self {
      StepOutcome::Ok => RunResult::Success,
      StepOutcome::Error(_) => RunResult::Failure,
    }
  }
}
