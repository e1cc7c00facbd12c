//! Tests for repair planning.

use proptest::prelude::*;

use crate::graph::FlowGraph;
use crate::repair::{effective_heads, open_blocks, plan_repair};
use crate::types::{ActionKind, FlowNode, NodeId, NodeKind};

fn started() -> FlowGraph {
  let mut g = FlowGraph::new();
  g.append(NodeKind::FlowStart, &[], "start").unwrap();
  g
}

fn push(g: &mut FlowGraph, kind: NodeKind, name: &str) -> FlowNode {
  let heads = g.heads().to_vec();
  g.append(kind, &heads, name).unwrap()
}

#[test]
fn nested_open_blocks_close_innermost_first() {
  let mut g = started();
  let outer = push(&mut g, NodeKind::StepStart { block: true }, "node");
  let inner = push(&mut g, NodeKind::StepStart { block: true }, "sleep");
  push(&mut g, NodeKind::Atom, "echo");

  assert_eq!(open_blocks(&g, g.heads()), vec![inner.id(), outer.id()]);

  let plan = plan_repair(&g, "killed");
  let kinds: Vec<NodeKind> = plan.nodes().iter().map(|n| n.kind()).collect();
  assert_eq!(
    kinds,
    vec![
      NodeKind::StepEnd { start: inner.id() },
      NodeKind::StepEnd { start: outer.id() },
      NodeKind::FlowEnd,
    ]
  );
  assert_eq!(plan.nodes()[0].parents(), &[NodeId::new(4)]);
  assert_eq!(plan.nodes()[1].parents(), &[NodeId::new(5)]);
  assert_eq!(plan.nodes()[2].parents(), &[NodeId::new(6)]);
  assert_eq!(plan.nodes()[0].name(), "sleep");
  assert!(plan.nodes().iter().all(|n| n.is_abnormal_closure()));
  assert!(plan.nodes()[2].has_action(ActionKind::Error));
}

#[test]
fn apply_closes_blocks_and_keeps_existing_nodes() {
  let mut g = started();
  let a = push(&mut g, NodeKind::StepStart { block: true }, "A");
  let before: Vec<String> = g.nodes_by_id().map(|n| n.name().to_string()).collect();

  let plan = plan_repair(&g, "dirty kill");
  let applied = plan.apply(&mut g).unwrap();
  assert_eq!(applied.len(), 2);
  assert_eq!(g.get(a.id()).unwrap().block_end(), Some(applied[0].id()));
  assert!(g.end_node().is_some());
  assert!(open_blocks(&g, g.heads()).is_empty());

  let after: Vec<String> = g.nodes_by_id().map(|n| n.name().to_string()).collect();
  assert_eq!(&after[..before.len()], &before[..]);
}

#[test]
fn ended_graph_needs_no_repair() {
  let mut g = started();
  push(&mut g, NodeKind::FlowEnd, "end");
  assert!(plan_repair(&g, "again").is_empty());
}

#[test]
fn empty_graph_gets_start_and_end() {
  let g = FlowGraph::new();
  let plan = plan_repair(&g, "nothing persisted");
  let kinds: Vec<NodeKind> = plan.nodes().iter().map(|n| n.kind()).collect();
  assert_eq!(kinds, vec![NodeKind::FlowStart, NodeKind::FlowEnd]);
  let mut g = g;
  plan.apply(&mut g).unwrap();
  assert_eq!(g.len(), 2);
}

#[test]
fn closed_block_whose_start_lost_its_back_reference_stays_closed() {
  // StepEnd persisted but the re-saved start was not.
  let mut g = started();
  let a = push(&mut g, NodeKind::StepStart { block: true }, "A");
  let end = push(&mut g, NodeKind::StepEnd { start: a.id() }, "A");
  let nodes: Vec<FlowNode> = g
    .nodes_by_id()
    .map(|n| {
      if n.id() == a.id() {
        FlowNode::new(n.id(), n.kind(), n.name(), n.parents().to_vec())
      } else {
        n.clone()
      }
    })
    .collect();
  let reloaded = FlowGraph::from_parts(nodes, vec![end.id()]);
  assert!(open_blocks(&reloaded, reloaded.heads()).is_empty());
}

#[test]
fn parallel_branches_join_in_first_synthesized_node() {
  let mut g = started();
  let par = push(&mut g, NodeKind::StepStart { block: true }, "parallel");
  let left = g
    .append(NodeKind::StepStart { block: true }, &[par.id()], "left")
    .unwrap();
  let right = g
    .append(NodeKind::StepStart { block: true }, &[par.id()], "right")
    .unwrap();
  assert_eq!(g.heads(), &[left.id(), right.id()]);

  let plan = plan_repair(&g, "killed");
  assert_eq!(plan.len(), 4);
  assert_eq!(plan.nodes()[0].kind(), NodeKind::StepEnd { start: right.id() });
  assert_eq!(plan.nodes()[0].parents(), &[left.id(), right.id()]);
  plan.apply(&mut g).unwrap();
  assert_eq!(g.heads().len(), 1);
}

#[test]
fn effective_heads_fall_back_to_childless_nodes() {
  let mut g = started();
  push(&mut g, NodeKind::Atom, "a");
  push(&mut g, NodeKind::Atom, "b");
  let nodes: Vec<FlowNode> = g.nodes_by_id().cloned().collect();
  // recorded head 9 was never persisted
  let reloaded = FlowGraph::from_parts(nodes, vec![NodeId::new(9)]);
  assert_eq!(effective_heads(&reloaded), vec![NodeId::new(3)]);
  assert_eq!(reloaded.next_id(), NodeId::new(10));
}

#[derive(Debug, Clone)]
enum Op {
  Atom,
  Open,
  Close,
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![Just(Op::Atom), Just(Op::Open), Just(Op::Close)]
}

proptest! {
  #[test]
  fn repair_is_idempotent(ops in prop::collection::vec(op(), 0..40)) {
    let mut g = started();
    let mut open = Vec::new();
    for op in ops {
      match op {
        Op::Atom => { push(&mut g, NodeKind::Atom, "atom"); }
        Op::Open => open.push(push(&mut g, NodeKind::StepStart { block: true }, "block").id()),
        Op::Close => {
          if let Some(start) = open.pop() {
            push(&mut g, NodeKind::StepEnd { start }, "block");
          }
        }
      }
    }
    let expected = open.len() + 1;

    let plan = plan_repair(&g, "prop");
    prop_assert_eq!(plan.len(), expected);
    plan.apply(&mut g).unwrap();
    prop_assert!(open_blocks(&g, g.heads()).is_empty());
    prop_assert_eq!(g.nodes_by_id().filter(|n| n.kind().is_flow_end()).count(), 1);
    prop_assert!(plan_repair(&g, "prop").is_empty());
  }
}
