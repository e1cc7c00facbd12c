//! Closing the graph of a run that cannot continue.
//!
//! A repair plan is computed from the graph alone and applied by the controller
//! through ordinary appends. Every block still open gets a synthesized
//! `StepEnd`, innermost first, and a single `FlowEnd` carrying the failure ends
//! the run. Existing nodes are never touched apart from the `BlockEnd` back
//! reference their closing node adds. A graph that already has a `FlowEnd` needs
//! no repair, so applying a plan twice is harmless.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{DurabilityError, Result};
use crate::graph::FlowGraph;
use crate::scanner::DepthFirstScanner;
use crate::types::{FlowNode, NodeAction, NodeId, NodeKind};

/// Name given to the `FlowStart` node.
pub const FLOW_START_NAME: &str = "start";
/// Name given to the `FlowEnd` node.
pub const FLOW_END_NAME: &str = "end";

/// Nodes to append, in order, with the ids they will receive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairPlan {
  nodes: Vec<FlowNode>,
}

impl RepairPlan {
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn nodes(&self) -> &[FlowNode] {
    &self.nodes
  }

  /// Appends the planned nodes to `graph` and returns them as stored.
  ///
  /// Fails with an integrity error if the graph changed since the plan was made.
  pub fn apply(&self, graph: &mut FlowGraph) -> Result<Vec<FlowNode>> {
    let mut applied = Vec::with_capacity(self.nodes.len());
    for planned in &self.nodes {
      let node = graph.append(planned.kind(), planned.parents(), planned.name())?;
      if node.id() != planned.id() {
        return Err(DurabilityError::integrity(format!(
          "repair planned node {} but graph assigned {}",
          planned.id(),
          node.id()
        )));
      }
      for action in planned.actions() {
        graph.attach_action(node.id(), action.clone())?;
      }
      applied.push(graph.get(node.id())?.clone());
    }
    Ok(applied)
  }
}

/// Heads to continue from: the recorded heads that resolve, else every node no
/// other node names as a parent (id order).
pub fn effective_heads(graph: &FlowGraph) -> Vec<NodeId> {
  let resolved: Vec<NodeId> = graph
    .heads()
    .iter()
    .copied()
    .filter(|h| graph.contains(*h))
    .collect();
  if !resolved.is_empty() {
    return resolved;
  }
  let parents: HashSet<NodeId> = graph
    .nodes_by_id()
    .flat_map(|n| n.parents().iter().copied())
    .collect();
  graph
    .nodes_by_id()
    .map(FlowNode::id)
    .filter(|id| !parents.contains(id))
    .collect()
}

/// Block starts reachable from `heads` that no reachable `StepEnd` closes,
/// innermost (most recently opened) first.
pub fn open_blocks(graph: &FlowGraph, heads: &[NodeId]) -> Vec<NodeId> {
  let mut starts = Vec::new();
  let mut closed = HashSet::new();
  for node in DepthFirstScanner::new(graph, heads) {
    if let Some(start) = node.kind().closes() {
      closed.insert(start);
    }
    if node.kind().opens_block() {
      if let Some(end) = node.block_end() {
        closed.insert(node.id());
        debug!(start = %node.id(), end = %end, "block already closed");
      }
      starts.push(node.id());
    }
  }
  starts.retain(|s| !closed.contains(s));
  starts.sort_unstable_by(|a, b| b.cmp(a));
  starts
}

/// Plans the nodes that close `graph` as a failed run, citing `reason`.
pub fn plan_repair(graph: &FlowGraph, reason: &str) -> RepairPlan {
  if graph.end_node().is_some() {
    return RepairPlan::default();
  }
  let mut next = graph.next_id();
  let mut nodes = Vec::new();
  let mut parents = effective_heads(graph);

  if graph.is_empty() {
    nodes.push(FlowNode::new(
      next,
      NodeKind::FlowStart,
      FLOW_START_NAME,
      Vec::new(),
    ));
    parents = vec![next];
    next = next.next();
  }

  for start in open_blocks(graph, &parents) {
    let name = graph
      .get(start)
      .map(|n| n.name().to_string())
      .unwrap_or_default();
    let mut end = FlowNode::new(next, NodeKind::StepEnd { start }, name, parents);
    end.attach(NodeAction::AbnormalClosure {
      reason: reason.to_string(),
    });
    nodes.push(end);
    parents = vec![next];
    next = next.next();
  }

  let mut end = FlowNode::new(next, NodeKind::FlowEnd, FLOW_END_NAME, parents);
  end.attach(NodeAction::error(reason));
  end.attach(NodeAction::AbnormalClosure {
    reason: reason.to_string(),
  });
  nodes.push(end);
  RepairPlan { nodes }
}
