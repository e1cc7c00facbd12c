//! Identity of a flow node within one execution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically assigned node id, unique within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
  /// Id given to the `FlowStart` node of every execution.
  pub const START: NodeId = NodeId(1);

  pub const fn new(value: u64) -> Self {
    Self(value)
  }

  pub const fn value(self) -> u64 {
    self.0
  }

  /// The id allocated right after this one.
  pub const fn next(self) -> Self {
    Self(self.0 + 1)
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}
