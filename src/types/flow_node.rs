//! A vertex of the execution graph.

use serde::{Deserialize, Serialize};

use super::{ActionKind, LogHandle, NodeAction, NodeId, NodeKind};

/// One immutable vertex of an execution graph.
///
/// Identity, kind, name and parents are fixed at creation. Only actions may be
/// attached afterwards, see [FlowNode::attach].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
  id: NodeId,
  kind: NodeKind,
  name: String,
  parents: Vec<NodeId>,
  #[serde(default)]
  actions: Vec<NodeAction>,
}

impl FlowNode {
  pub(crate) fn new(
    id: NodeId,
    kind: NodeKind,
    name: impl Into<String>,
    parents: Vec<NodeId>,
  ) -> Self {
    Self {
      id,
      kind,
      name: name.into(),
      parents,
      actions: Vec::new(),
    }
  }

  pub fn id(&self) -> NodeId {
    self.id
  }

  pub fn kind(&self) -> NodeKind {
    self.kind
  }

  /// Display function name of the step (e.g. `sleep`, `echo`).
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn parents(&self) -> &[NodeId] {
    &self.parents
  }

  pub fn actions(&self) -> &[NodeAction] {
    &self.actions
  }

  pub fn action(&self, kind: ActionKind) -> Option<&NodeAction> {
    self.actions.iter().find(|a| a.kind() == kind)
  }

  pub fn has_action(&self, kind: ActionKind) -> bool {
    self.action(kind).is_some()
  }

  /// Attaches an action, replacing any previous action of the same kind.
  pub(crate) fn attach(&mut self, action: NodeAction) {
    match self.actions.iter_mut().find(|a| a.kind() == action.kind()) {
      Some(existing) => *existing = action,
      None => self.actions.push(action),
    }
  }

  pub fn log_handle(&self) -> Option<&LogHandle> {
    match self.action(ActionKind::Log) {
      Some(NodeAction::Log { handle }) => Some(handle),
      _ => None,
    }
  }

  /// The node that closed this block start, once the block has closed.
  pub fn block_end(&self) -> Option<NodeId> {
    match self.action(ActionKind::BlockEnd) {
      Some(NodeAction::BlockEnd { end }) => Some(*end),
      _ => None,
    }
  }

  /// True if recovery synthesized this node.
  pub fn is_abnormal_closure(&self) -> bool {
    self.has_action(ActionKind::AbnormalClosure)
  }
}
