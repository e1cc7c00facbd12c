//! In-memory execution graph: append-only nodes plus the current heads.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::error::{DurabilityError, Result};
use crate::scanner::{DepthFirstScanner, LinearScanner, NodeLookup};
use crate::types::{FlowNode, NodeAction, NodeId, NodeKind};

/// Append-only DAG of flow nodes rooted at one `FlowStart`.
///
/// Structure is enforced on [FlowGraph::append]: parents must already exist, so ids
/// only ever point backwards and the graph cannot contain cycles. At most one start
/// and one end exist.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
  nodes: BTreeMap<NodeId, FlowNode>,
  heads: Vec<NodeId>,
  next_id: Option<NodeId>,
}

impl FlowGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Rebuilds a graph from persisted nodes and heads. Gaps in the node set are
  /// allowed; they surface as skipped nodes during scans. New ids continue after
  /// both the highest stored node and the highest head.
  pub fn from_parts(nodes: impl IntoIterator<Item = FlowNode>, heads: Vec<NodeId>) -> Self {
    let nodes: BTreeMap<NodeId, FlowNode> = nodes.into_iter().map(|n| (n.id(), n)).collect();
    let next_id = nodes
      .keys()
      .next_back()
      .copied()
      .into_iter()
      .chain(heads.iter().copied())
      .max()
      .map(|id| id.next());
    Self {
      nodes,
      heads,
      next_id,
    }
  }

  /// Appends a node whose parents are exactly `parents`.
  ///
  /// Parents normally are current heads; naming an older node forks a new branch
  /// (parallel steps). Parents that were heads stop being heads, and the new node
  /// takes the position of its first parent in the head list, or goes last when
  /// it forks.
  /// Closing a block also attaches a [NodeAction::BlockEnd] to its start node.
  #[instrument(level = "trace", skip(self, name))]
  pub fn append(
    &mut self,
    kind: NodeKind,
    parents: &[NodeId],
    name: impl Into<String>,
  ) -> Result<FlowNode> {
    self.check_append(kind, parents)?;
    let id = self.next_id.unwrap_or(NodeId::START);
    let node = FlowNode::new(id, kind, name, parents.to_vec());

    if let Some(start) = kind.closes() {
      if let Some(start_node) = self.nodes.get_mut(&start) {
        start_node.attach(NodeAction::BlockEnd { end: id });
      }
    }

    let mut heads = Vec::with_capacity(self.heads.len() + 1);
    let mut position = None;
    for head in &self.heads {
      if !parents.contains(head) {
        heads.push(*head);
      } else if parents.first() == Some(head) {
        position = Some(heads.len());
      }
    }
    heads.insert(position.unwrap_or(heads.len()), id);
    self.heads = heads;

    self.nodes.insert(id, node.clone());
    self.next_id = Some(id.next());
    Ok(node)
  }

  fn check_append(&self, kind: NodeKind, parents: &[NodeId]) -> Result<()> {
    if kind.is_flow_start() {
      if !self.nodes.is_empty() || !parents.is_empty() {
        return Err(DurabilityError::integrity(
          "flow start must be the first node and have no parents",
        ));
      }
      return Ok(());
    }
    if self.nodes.is_empty() {
      return Err(DurabilityError::integrity("graph has no flow start"));
    }
    if self.end_node().is_some() {
      return Err(DurabilityError::integrity("graph already has a flow end"));
    }
    if parents.is_empty() {
      return Err(DurabilityError::integrity(format!(
        "{:?} node needs at least one parent",
        kind
      )));
    }
    for (i, parent) in parents.iter().enumerate() {
      self.get(*parent)?;
      if parents[..i].contains(parent) {
        return Err(DurabilityError::integrity(format!(
          "parent {} listed twice",
          parent
        )));
      }
    }
    if let Some(start) = kind.closes() {
      let start_node = self.get(start)?;
      if !start_node.kind().opens_block() {
        return Err(DurabilityError::integrity(format!(
          "node {} does not open a block",
          start
        )));
      }
      if let Some(end) = start_node.block_end() {
        return Err(DurabilityError::integrity(format!(
          "block {} already closed by {}",
          start, end
        )));
      }
    }
    Ok(())
  }

  /// Attaches an action to an existing node, replacing one of the same kind.
  pub fn attach_action(&mut self, id: NodeId, action: NodeAction) -> Result<&FlowNode> {
    let node = self
      .nodes
      .get_mut(&id)
      .ok_or(DurabilityError::NotFound(id))?;
    node.attach(action);
    Ok(node)
  }

  pub fn get(&self, id: NodeId) -> Result<&FlowNode> {
    self.nodes.get(&id).ok_or(DurabilityError::NotFound(id))
  }

  pub fn contains(&self, id: NodeId) -> bool {
    self.nodes.contains_key(&id)
  }

  pub fn heads(&self) -> &[NodeId] {
    &self.heads
  }

  /// Replaces the heads after a reload found the persisted ones unusable.
  pub(crate) fn set_heads(&mut self, heads: Vec<NodeId>) {
    self.heads = heads;
  }

  /// Head nodes in head order. Heads that cannot be resolved are skipped.
  pub fn head_nodes(&self) -> Vec<&FlowNode> {
    self.heads.iter().filter_map(|h| self.nodes.get(h)).collect()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// The id the next appended node will get.
  pub fn next_id(&self) -> NodeId {
    self.next_id.unwrap_or(NodeId::START)
  }

  /// Every stored node in id order.
  pub fn nodes_by_id(&self) -> impl Iterator<Item = &FlowNode> {
    self.nodes.values()
  }

  pub fn end_node(&self) -> Option<&FlowNode> {
    self.nodes.values().rev().find(|n| n.kind().is_flow_end())
  }

  /// Depth-first traversal from the heads over every reachable node.
  pub fn all_nodes(&self) -> DepthFirstScanner<'_, Self> {
    DepthFirstScanner::new(self, &self.heads)
  }

  /// First-parent traversal from the first head back to the start.
  pub fn linear_nodes(&self) -> LinearScanner<'_, Self> {
    LinearScanner::new(self, &self.heads)
  }

  /// Reachable nodes matching `predicate`, in depth-first order.
  pub fn filtered_nodes<P>(&self, mut predicate: P) -> Vec<&FlowNode>
  where
    P: FnMut(&FlowNode) -> bool,
  {
    self.all_nodes().filter(|n| predicate(n)).collect()
  }
}

impl NodeLookup for FlowGraph {
  fn lookup(&self, id: NodeId) -> Option<&FlowNode> {
    self.nodes.get(&id)
  }
}
