//! Lazy traversals over a flow graph, walking from the heads back to the start.
//!
//! Scanners are plain iterators: restarting a traversal means building a new
//! scanner from the same heads. Both tolerate a graph without a terminal node and
//! skip ids that cannot be resolved (unreadable or missing nodes) instead of
//! failing. Loops cannot occur because parents are fixed when a node is created,
//! but the depth-first scanner still visits every node at most once since join
//! nodes make several paths reach the same ancestor.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::types::{FlowNode, NodeId};

/// Read access to nodes by id.
pub trait NodeLookup {
  fn lookup(&self, id: NodeId) -> Option<&FlowNode>;
}

impl NodeLookup for BTreeMap<NodeId, FlowNode> {
  fn lookup(&self, id: NodeId) -> Option<&FlowNode> {
    self.get(&id)
  }
}

/// Visits every node reachable from the heads, depth-first, parents in order.
pub struct DepthFirstScanner<'g, G: NodeLookup + ?Sized> {
  graph: &'g G,
  stack: Vec<NodeId>,
  visited: HashSet<NodeId>,
}

impl<'g, G: NodeLookup + ?Sized> DepthFirstScanner<'g, G> {
  pub fn new(graph: &'g G, heads: &[NodeId]) -> Self {
    Self {
      graph,
      stack: heads.iter().rev().copied().collect(),
      visited: HashSet::new(),
    }
  }
}

impl<'g, G: NodeLookup + ?Sized> Iterator for DepthFirstScanner<'g, G> {
  type Item = &'g FlowNode;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(id) = self.stack.pop() {
      if !self.visited.insert(id) {
        continue;
      }
      match self.graph.lookup(id) {
        Some(node) => {
          self.stack.extend(node.parents().iter().rev().copied());
          return Some(node);
        }
        None => debug!(node_id = %id, "skipping unresolvable node during scan"),
      }
    }
    None
  }
}

/// Follows first parents from the first head back to the start.
///
/// On a graph with parallel branches this only sees one branch, so it is meant
/// for quick "what happened last" views rather than full enumeration.
pub struct LinearScanner<'g, G: NodeLookup + ?Sized> {
  graph: &'g G,
  next: Option<NodeId>,
}

impl<'g, G: NodeLookup + ?Sized> LinearScanner<'g, G> {
  pub fn new(graph: &'g G, heads: &[NodeId]) -> Self {
    Self {
      graph,
      next: heads.first().copied(),
    }
  }
}

impl<'g, G: NodeLookup + ?Sized> Iterator for LinearScanner<'g, G> {
  type Item = &'g FlowNode;

  fn next(&mut self) -> Option<Self::Item> {
    let id = self.next.take()?;
    match self.graph.lookup(id) {
      Some(node) => {
        self.next = node.parents().first().copied();
        Some(node)
      }
      None => {
        debug!(node_id = %id, "linear scan stopped at unresolvable node");
        None
      }
    }
  }
}
