//! Crash and restart scenarios across durability hints.
//!
//! A scripted program of block steps drives a controller the way an interpreter
//! would. A hard kill is simulated by dropping the controller without shutdown;
//! the restart is a fresh `RecoveryCoordinator` over the same root.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flow_durability::{
  ActionKind, DurabilityHint, EngineConfig, ExecutionController, ExecutionPhase, FlowNode,
  LocalExecutorHost, NodeAction, NodeId, NodeKind, NodeSpec, ProgramResumer, RecoveryCoordinator,
  RecoveryOutcome, RunResult, StepOutcome, TerminationMode,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

const STEPS: [&str; 2] = ["A", "B"];

/// Continuation of the script: the next step, and the block it is inside.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ScriptState {
  next: usize,
  open: Option<u64>,
}

/// Where the script stops, as if the process died there.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stop {
  Never,
  /// Before opening step `n`.
  BeforeStep(usize),
  /// Inside step `n`, after its start node and checkpoint.
  Blocked(usize),
}

/// Runs the script from `state`; true once the run finished.
async fn run_script(execution: &ExecutionController, mut state: ScriptState, stop: Stop) -> bool {
  loop {
    if state.next == STEPS.len() {
      execution.finish(StepOutcome::Ok).await.unwrap();
      return true;
    }
    let name = STEPS[state.next];
    match state.open {
      None => {
        if stop == Stop::BeforeStep(state.next) {
          return false;
        }
        let start = execution
          .append(NodeSpec::block_start(name).with_action(NodeAction::log(format!("{}.log", name))))
          .await
          .unwrap();
        state.open = Some(start.id().value());
        execution
          .checkpoint(serde_json::to_vec(&state).unwrap())
          .await
          .unwrap();
        if stop == Stop::Blocked(state.next) {
          return false;
        }
      }
      Some(start) => {
        execution
          .append(NodeSpec::block_end(NodeId::new(start), name))
          .await
          .unwrap();
        state.open = None;
        state.next += 1;
        execution
          .checkpoint(serde_json::to_vec(&state).unwrap())
          .await
          .unwrap();
      }
    }
  }
}

/// Reinstalls the script and keeps driving it in a task.
#[derive(Default)]
struct ScriptResumer {
  /// Only record the continuation instead of driving the program.
  passive: bool,
  runs: Mutex<Vec<JoinHandle<bool>>>,
}

impl ScriptResumer {
  fn passive() -> Self {
    Self {
      passive: true,
      ..Self::default()
    }
  }

  async fn join(&self) -> Vec<bool> {
    let handles: Vec<JoinHandle<bool>> = self.runs.lock().unwrap().drain(..).collect();
    let mut finished = Vec::new();
    for handle in handles {
      finished.push(handle.await.unwrap());
    }
    finished
  }
}

#[async_trait]
impl ProgramResumer for ScriptResumer {
  async fn resume(
    &self,
    execution: Arc<ExecutionController>,
    continuation: &[u8],
  ) -> Result<(), String> {
    let state: ScriptState = serde_json::from_slice(continuation).map_err(|e| e.to_string())?;
    if !self.passive {
      let handle = tokio::spawn(async move { run_script(&execution, state, Stop::Never).await });
      self.runs.lock().unwrap().push(handle);
    }
    Ok(())
  }
}

struct Root {
  _dir: tempfile::TempDir,
  path: PathBuf,
}

impl Root {
  fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    Self { _dir: dir, path }
  }

  fn run_dir(&self) -> PathBuf {
    self.path.join("run")
  }

  fn host(&self, termination: TerminationMode) -> Arc<LocalExecutorHost> {
    Arc::new(LocalExecutorHost::with_termination(&self.path, termination))
  }
}

async fn start(root: &Root, hint: DurabilityHint) -> Arc<ExecutionController> {
  ExecutionController::start(
    &root.run_dir(),
    "run",
    Some(hint),
    &EngineConfig::default(),
    root.host(TerminationMode::Clean),
  )
  .await
  .unwrap()
}

/// Restarts the process: a single recovery pass over the root.
async fn restart(
  root: &Root,
  termination: TerminationMode,
  resumer: Arc<ScriptResumer>,
) -> (RecoveryOutcome, Arc<ExecutionController>) {
  let coordinator = RecoveryCoordinator::new(
    &root.path,
    root.host(termination),
    resumer,
    EngineConfig::default(),
  );
  let mut reports = coordinator.recover_all().await.unwrap();
  assert_eq!(reports.len(), 1);
  let report = reports.remove(0);
  (report.outcome, report.execution.unwrap())
}

async fn reopen(path: &Path) -> Arc<ExecutionController> {
  ExecutionController::open(
    path,
    &EngineConfig::default(),
    Arc::new(LocalExecutorHost::with_termination(path, TerminationMode::Clean)),
  )
  .await
  .unwrap()
}

/// (kind, name) of every node in id order.
async fn shape(execution: &ExecutionController) -> Vec<(NodeKind, String)> {
  execution
    .with_graph(|g| {
      g.nodes_by_id()
        .map(|n| (n.kind(), n.name().to_string()))
        .collect()
    })
    .await
}

fn log_handles(nodes: &[FlowNode]) -> Vec<String> {
  let mut handles: Vec<String> = nodes
    .iter()
    .filter_map(|n| n.log_handle().map(|h| h.as_str().to_string()))
    .collect();
  handles.sort();
  handles
}

#[tokio::test]
async fn completed_run_survives_clean_restart_for_every_hint() {
  for hint in DurabilityHint::ALL {
    let root = Root::new();
    let execution = start(&root, hint).await;
    assert!(run_script(&execution, ScriptState::default(), Stop::Never).await);
    let before = execution.all_nodes().await;
    let before_shape = shape(&execution).await;
    drop(execution);

    let resumer = Arc::new(ScriptResumer::default());
    let (outcome, _) = restart(&root, TerminationMode::Clean, resumer).await;
    assert!(matches!(outcome, RecoveryOutcome::Skipped { .. }), "{:?}", hint);

    let reopened = reopen(&root.run_dir()).await;
    assert_eq!(reopened.durability_hint(), hint);
    assert_eq!(reopened.result(), RunResult::Success);
    let heads = reopened.current_heads().await;
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].kind(), NodeKind::FlowEnd);
    assert_eq!(shape(&reopened).await, before_shape);
    assert_eq!(log_handles(&reopened.all_nodes().await), log_handles(&before));
    assert_eq!(log_handles(&before), vec!["A.log", "B.log"]);
  }
}

#[tokio::test]
async fn max_survivability_resumes_after_kill_while_blocked() {
  let reference = Root::new();
  let uninterrupted = start(&reference, DurabilityHint::MaxSurvivability).await;
  run_script(&uninterrupted, ScriptState::default(), Stop::Never).await;
  let expected = shape(&uninterrupted).await;

  let root = Root::new();
  let execution = start(&root, DurabilityHint::MaxSurvivability).await;
  assert!(!run_script(&execution, ScriptState::default(), Stop::Blocked(0)).await);
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer.clone()).await;
  assert_eq!(outcome, RecoveryOutcome::Resumed);
  assert_eq!(resumer.join().await, vec![true]);
  assert_eq!(execution.result(), RunResult::Success);
  assert_eq!(shape(&execution).await, expected);
}

#[tokio::test]
async fn max_survivability_resumes_between_steps_with_six_nodes() {
  let root = Root::new();
  let execution = start(&root, DurabilityHint::MaxSurvivability).await;
  run_script(&execution, ScriptState::default(), Stop::BeforeStep(1)).await;
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer.clone()).await;
  assert_eq!(outcome, RecoveryOutcome::Resumed);
  resumer.join().await;
  let nodes = shape(&execution).await;
  assert_eq!(nodes.len(), 6);
  assert_eq!(nodes[5].0, NodeKind::FlowEnd);
  assert_eq!(execution.result(), RunResult::Success);
}

#[tokio::test]
async fn survivable_nonatomic_resumes_after_dirty_kill() {
  let root = Root::new();
  let execution = start(&root, DurabilityHint::SurvivableNonatomic).await;
  run_script(&execution, ScriptState::default(), Stop::Blocked(1)).await;
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer.clone()).await;
  assert_eq!(outcome, RecoveryOutcome::Resumed);
  resumer.join().await;
  assert_eq!(execution.result(), RunResult::Success);
  assert_eq!(shape(&execution).await.len(), 6);
}

#[tokio::test]
async fn performance_optimized_dirty_kill_fails_with_closed_graph() {
  let root = Root::new();
  let execution = start(&root, DurabilityHint::PerformanceOptimized).await;
  let a = execution.append(NodeSpec::block_start("A")).await.unwrap();
  // as a background flush would
  execution.flush().await.unwrap();
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer).await;
  assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));
  assert_eq!(execution.phase(), ExecutionPhase::Complete(RunResult::Failure));

  let nodes: Vec<FlowNode> = execution
    .with_graph(|g| g.nodes_by_id().cloned().collect())
    .await;
  let kinds: Vec<NodeKind> = nodes.iter().map(|n| n.kind()).collect();
  assert_eq!(
    kinds,
    vec![
      NodeKind::FlowStart,
      NodeKind::StepStart { block: true },
      NodeKind::StepEnd { start: a.id() },
      NodeKind::FlowEnd,
    ]
  );
  assert!(nodes[2].is_abnormal_closure());
  assert!(nodes[3].has_action(ActionKind::Error));
  assert!(nodes.len() < 6);

  // the repaired graph is what a later restart sees
  let reopened = reopen(&root.run_dir()).await;
  assert_eq!(shape(&reopened).await.len(), 4);
  assert_eq!(reopened.result(), RunResult::Failure);
}

#[tokio::test]
async fn performance_optimized_unflushed_nodes_are_lost_but_graph_stays_well_formed() {
  let root = Root::new();
  let execution = start(&root, DurabilityHint::PerformanceOptimized).await;
  run_script(&execution, ScriptState::default(), Stop::Blocked(0)).await;
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer).await;
  assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));
  let heads = execution.current_heads().await;
  assert_eq!(heads.len(), 1);
  assert_eq!(heads[0].kind(), NodeKind::FlowEnd);
  assert_eq!(heads[0].parents(), &[NodeId::START]);
}

#[tokio::test]
async fn performance_optimized_resumes_after_clean_shutdown() {
  let root = Root::new();
  let execution = start(&root, DurabilityHint::PerformanceOptimized).await;
  run_script(&execution, ScriptState::default(), Stop::Blocked(0)).await;
  execution.shutdown().await.unwrap();
  assert!(execution.is_persisted_fully().await);
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Clean, resumer.clone()).await;
  assert_eq!(outcome, RecoveryOutcome::Resumed);
  assert_eq!(resumer.join().await, vec![true]);
  assert_eq!(shape(&execution).await.len(), 6);
}

#[tokio::test]
async fn pause_makes_batched_run_survive_dirty_kill() {
  let root = Root::new();
  let execution = start(&root, DurabilityHint::PerformanceOptimized).await;
  run_script(&execution, ScriptState::default(), Stop::Blocked(0)).await;
  assert!(!execution.is_persisted_fully().await);
  execution.pause(true).await.unwrap();
  assert!(execution.is_persisted_fully().await);
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer.clone()).await;
  assert_eq!(outcome, RecoveryOutcome::Resumed);
  assert!(execution.is_paused());

  execution.pause(false).await.unwrap();
  assert_eq!(resumer.join().await, vec![true]);
  assert_eq!(execution.result(), RunResult::Success);
  assert_eq!(shape(&execution).await.len(), 6);
}

#[tokio::test]
async fn dirty_after_resume_fails_and_keeps_name_prefix() {
  let root = Root::new();
  let execution = start(&root, DurabilityHint::PerformanceOptimized).await;
  run_script(&execution, ScriptState::default(), Stop::Blocked(0)).await;
  execution.pause(true).await.unwrap();
  drop(execution);

  let resumer = Arc::new(ScriptResumer::passive());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer).await;
  assert_eq!(outcome, RecoveryOutcome::Resumed);
  execution.pause(false).await.unwrap();
  execution.append(NodeSpec::atom("echo")).await.unwrap();
  execution.flush().await.unwrap();
  let seen: Vec<String> = shape(&execution)
    .await
    .into_iter()
    .map(|(_, name)| name)
    .collect();
  // never flushed: lost with the kill
  execution.append(NodeSpec::atom("sleep")).await.unwrap();
  drop(execution);

  let resumer = Arc::new(ScriptResumer::default());
  let (outcome, execution) = restart(&root, TerminationMode::Dirty, resumer).await;
  assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));
  let names: Vec<String> = shape(&execution)
    .await
    .into_iter()
    .map(|(_, name)| name)
    .collect();
  assert_eq!(&names[..seen.len()], &seen[..]);
  assert_eq!(seen, vec!["start", "A", "echo"]);
}
