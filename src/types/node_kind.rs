//! Kind tag of a flow node.

use serde::{Deserialize, Serialize};

use super::NodeId;

/// Kind tag of a flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
  /// Root of the graph; exactly one per execution.
  FlowStart,
  /// Terminal node; at most one per execution and never a parent.
  FlowEnd,
  /// Start of a step. When `block` is set it opens a body closed by a [NodeKind::StepEnd].
  StepStart { block: bool },
  /// Closes the block opened by `start`.
  StepEnd { start: NodeId },
  /// Generic step without a body.
  Atom,
}

impl NodeKind {
  pub fn is_flow_start(&self) -> bool {
    matches!(self, NodeKind::FlowStart)
  }

  pub fn is_flow_end(&self) -> bool {
    matches!(self, NodeKind::FlowEnd)
  }

  pub fn is_step_start(&self) -> bool {
    matches!(self, NodeKind::StepStart { .. })
  }

  pub fn is_step_end(&self) -> bool {
    matches!(self, NodeKind::StepEnd { .. })
  }

  /// True for a step start that opens a block.
  pub fn opens_block(&self) -> bool {
    matches!(self, NodeKind::StepStart { block: true })
  }

  /// True for the nodes that represent a step invocation (not the flow boundaries).
  pub fn is_step(&self) -> bool {
    matches!(
      self,
      NodeKind::StepStart { .. } | NodeKind::StepEnd { .. } | NodeKind::Atom
    )
  }

  /// The block start this node closes, if it is a [NodeKind::StepEnd].
  pub fn closes(&self) -> Option<NodeId> {
    match self {
      NodeKind::StepEnd { start } => Some(*start),
      _ => None,
    }
  }
}
