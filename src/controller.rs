//! Execution controller: the single writer of one run's graph, record and program
//! checkpoint.
//!
//! ## Clean flag protocol
//!
//! Before the first mutation that is not yet durable, the record on disk is
//! rewritten with [CleanFlag::Dirty]. Once the mutation (and everything before
//! it) is on stable storage, the record is rewritten with [CleanFlag::Clean] and
//! the new heads. Immediate storage runs the whole cycle on every append; batched
//! storage stays dirty until the next safe point (flush, pause, block close,
//! shutdown). After a storage failure the flag is never set clean again by this
//! controller; the next recovery pass decides.
//!
//! ## Phases
//!
//! ```text
//! Running --pause--> Pausing --(flushed)--> Paused --unpause--> Running
//! Running --finish--> Complete(result)
//! (recovery) Resuming --> Running | Complete(Failure)
//! ```
//!
//! Appends issued while pausing or paused wait until the run is unpaused. Actions
//! and checkpoints are still accepted while paused and are persisted at once, so
//! a paused run stays fully persisted.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{DurabilityError, Result};
use crate::graph::FlowGraph;
use crate::host::ExecutorHost;
use crate::policy::DurabilityPolicy;
use crate::record_io;
use crate::repair::{self, FLOW_END_NAME, FLOW_START_NAME};
use crate::storage::NodeStorage;
use crate::storage::atomic::blocking;
use crate::types::{
  CleanFlag, DurabilityHint, ExecutionPhase, ExecutionRecord, FlowNode, NodeAction, NodeId,
  NodeKind, ProgramCheckpoint, RecordStatus, RunResult, StepOutcome,
};

/// A node the interpreter wants appended.
#[derive(Debug, Clone)]
pub struct NodeSpec {
  kind: NodeKind,
  name: String,
  parents: Option<Vec<NodeId>>,
  actions: Vec<NodeAction>,
}

impl NodeSpec {
  pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
      parents: None,
      actions: Vec::new(),
    }
  }

  /// A step without a body.
  pub fn atom(name: impl Into<String>) -> Self {
    Self::new(NodeKind::Atom, name)
  }

  /// A step start that opens a block.
  pub fn block_start(name: impl Into<String>) -> Self {
    Self::new(NodeKind::StepStart { block: true }, name)
  }

  /// Closes the block opened by `start`.
  pub fn block_end(start: NodeId, name: impl Into<String>) -> Self {
    Self::new(NodeKind::StepEnd { start }, name)
  }

  /// Explicit parents. Without them the node follows every current head.
  pub fn with_parents(mut self, parents: impl Into<Vec<NodeId>>) -> Self {
    self.parents = Some(parents.into());
    self
  }

  pub fn with_action(mut self, action: NodeAction) -> Self {
    self.actions.push(action);
    self
  }
}

/// What reopening a persisted run found on disk.
#[derive(Debug, Default)]
pub(crate) struct LoadReport {
  /// `(unit, error)` for node files that could not be read.
  pub node_failures: Vec<(String, String)>,
  /// Recorded heads that did not resolve to a loaded node.
  pub unresolved_heads: Vec<NodeId>,
  /// Why the program checkpoint could not be read, if it could not.
  pub program_error: Option<String>,
}

struct Inner {
  graph: FlowGraph,
  storage: Box<dyn NodeStorage>,
  record: ExecutionRecord,
  /// Flag value of the record as last written.
  disk_flag: CleanFlag,
  program: Option<ProgramCheckpoint>,
  program_persisted: bool,
  /// First storage failure; once set the flag stays dirty.
  storage_error: Option<String>,
}

/// Controller of one execution.
///
/// Shared as `Arc<ExecutionController>` between the interpreter, recovery and
/// the background flusher.
pub struct ExecutionController {
  run_id: String,
  run_dir: PathBuf,
  policy: DurabilityPolicy,
  host: Arc<dyn ExecutorHost>,
  phase: watch::Sender<ExecutionPhase>,
  inner: Mutex<Inner>,
}

impl std::fmt::Debug for ExecutionController {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionController")
      .field("run_id", &self.run_id)
      .field("run_dir", &self.run_dir)
      .field("hint", &self.policy.hint())
      .field("phase", &self.phase())
      .finish()
  }
}

impl ExecutionController {
  /// Creates a run in `run_dir` with a `FlowStart` node and persists it.
  ///
  /// Creation is a safe point: the start node and a clean record are on disk
  /// when this returns.
  #[instrument(level = "trace", skip(config, host))]
  pub async fn start(
    run_dir: &Path,
    run_id: &str,
    hint: Option<DurabilityHint>,
    config: &EngineConfig,
    host: Arc<dyn ExecutorHost>,
  ) -> Result<Arc<Self>> {
    if record_io::is_run_dir(run_dir) {
      return Err(DurabilityError::Config(format!(
        "{} already holds a run",
        run_dir.display()
      )));
    }
    let hint = config.resolve_hint(hint);
    let policy = DurabilityPolicy::new(hint);
    let dir = run_dir.to_path_buf();
    blocking(move || Ok(std::fs::create_dir_all(&dir)?)).await?;
    let storage = policy.open_storage(run_dir).await?;

    let mut graph = FlowGraph::new();
    let start = graph.append(NodeKind::FlowStart, &[], FLOW_START_NAME)?;
    let controller = Arc::new(Self {
      run_id: run_id.to_string(),
      run_dir: run_dir.to_path_buf(),
      policy,
      host,
      phase: watch::Sender::new(ExecutionPhase::Running),
      inner: Mutex::new(Inner {
        graph,
        storage,
        record: ExecutionRecord::new(run_id, hint),
        disk_flag: CleanFlag::Unknown,
        program: None,
        program_persisted: true,
        storage_error: None,
      }),
    });

    {
      let mut inner = controller.inner.lock().await;
      controller.write_dirty(&mut inner).await?;
      inner.storage.save(&start).await?;
      controller.persist_safe_point(&mut inner).await?;
    }
    info!(run_id, hint = %hint, "execution started");
    controller.spawn_background_flush(config);
    Ok(controller)
  }

  /// A fresh random run id.
  pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
  }

  /// Reopens a persisted run. The phase reflects the record: complete runs are
  /// `Complete`, paused runs `Paused`, anything else `Running`; whether a
  /// running run may actually continue is decided by recovery.
  pub async fn open(
    run_dir: &Path,
    config: &EngineConfig,
    host: Arc<dyn ExecutorHost>,
  ) -> Result<Arc<Self>> {
    Self::open_with_report(run_dir, config, host)
      .await
      .map(|(c, _)| c)
  }

  #[instrument(level = "trace", skip(config, host))]
  pub(crate) async fn open_with_report(
    run_dir: &Path,
    config: &EngineConfig,
    host: Arc<dyn ExecutorHost>,
  ) -> Result<(Arc<Self>, LoadReport)> {
    let dir = run_dir.to_path_buf();
    let record = blocking(move || record_io::load_record(&dir)).await?;
    let policy = DurabilityPolicy::new(record.hint);
    let storage = policy.open_storage(run_dir).await?;
    let loaded = storage.load_all().await?;
    for (unit, e) in &loaded.failures {
      warn!(run_id = %record.run_id, unit = %unit, error = %e, "unreadable node data");
    }

    let mut graph = FlowGraph::from_parts(loaded.nodes, record.heads.clone());
    let unresolved_heads: Vec<NodeId> = record
      .heads
      .iter()
      .copied()
      .filter(|h| !graph.contains(*h))
      .collect();
    let heads = repair::effective_heads(&graph);
    if heads != graph.heads() {
      warn!(run_id = %record.run_id, recorded = ?record.heads, effective = ?heads, "recorded heads do not resolve");
      graph.set_heads(heads);
    }

    let dir = run_dir.to_path_buf();
    let (program, program_error) =
      match blocking(move || Ok(record_io::load_program(&dir))).await? {
        Ok(program) => (program, None),
        Err(e) => (None, Some(e.to_string())),
      };

    let phase = if record.is_complete() {
      ExecutionPhase::Complete(record.result)
    } else if record.is_paused() {
      ExecutionPhase::Paused
    } else {
      ExecutionPhase::Running
    };
    debug!(run_id = %record.run_id, nodes = graph.len(), phase = %phase, "execution reopened");

    let controller = Arc::new(Self {
      run_id: record.run_id.clone(),
      run_dir: run_dir.to_path_buf(),
      policy,
      host,
      phase: watch::Sender::new(phase),
      inner: Mutex::new(Inner {
        graph,
        storage,
        disk_flag: record.clean,
        record,
        program_persisted: true,
        program,
        storage_error: None,
      }),
    });
    if !phase.is_complete() {
      controller.spawn_background_flush(config);
    }
    Ok((
      controller,
      LoadReport {
        node_failures: loaded.failures,
        unresolved_heads,
        program_error,
      },
    ))
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn run_dir(&self) -> &Path {
    &self.run_dir
  }

  pub fn durability_hint(&self) -> DurabilityHint {
    self.policy.hint()
  }

  pub fn phase(&self) -> ExecutionPhase {
    *self.phase.borrow()
  }

  /// Watches phase transitions.
  pub fn subscribe(&self) -> watch::Receiver<ExecutionPhase> {
    self.phase.subscribe()
  }

  pub fn is_complete(&self) -> bool {
    self.phase().is_complete()
  }

  pub fn is_paused(&self) -> bool {
    self.phase() == ExecutionPhase::Paused
  }

  /// `Pending` until the run completes.
  pub fn result(&self) -> RunResult {
    self.phase().result()
  }

  /// Appends a step node and persists it according to the run's policy.
  ///
  /// Flow boundaries are not appended here: the start is created by
  /// [ExecutionController::start] and the end by [ExecutionController::finish].
  /// Step nodes get a [NodeAction::Timing] unless one is already attached. Closing a
  /// block is a safe point.
  ///
  /// A storage failure is logged and leaves the run dirty; the node is still
  /// returned. A structural violation fails the run.
  #[instrument(level = "trace", skip(self), fields(run_id = %self.run_id))]
  pub async fn append(&self, request: NodeSpec) -> Result<FlowNode> {
    if request.kind.is_flow_start() || request.kind.is_flow_end() {
      return Err(DurabilityError::InvalidState {
        phase: self.phase(),
        operation: "append flow boundary node",
      });
    }
    let mut inner = self.lock_unpaused("append").await?;

    let parents = request
      .parents
      .unwrap_or_else(|| inner.graph.heads().to_vec());
    let node = match self.append_to_graph(&mut inner, request.kind, &parents, &request.name, request.actions) {
      Ok(node) => node,
      Err(e) => {
        if e.is_integrity_failure() {
          error!(run_id = %self.run_id, error = %e, "graph integrity failure, failing execution");
          self.close_as_failed(&mut inner, &e.to_string()).await;
        }
        return Err(e);
      }
    };

    let closes_block = node.kind().closes();
    self.write_dirty(&mut inner).await.ok();
    if let Err(e) = self.save_node(&mut inner, &node).await {
      self.note_storage_failure(&mut inner, &e);
      return Ok(node);
    }
    if closes_block.is_some() {
      if let Err(e) = self.persist_safe_point(&mut inner).await {
        self.note_storage_failure(&mut inner, &e);
      }
    } else if inner.storage.is_persisted_fully() {
      if let Err(e) = self.write_clean(&mut inner).await {
        self.note_storage_failure(&mut inner, &e);
      }
    }
    debug!(run_id = %self.run_id, node_id = %node.id(), kind = ?node.kind(), "appended node");
    Ok(node)
  }

  /// Attaches an action to an existing node and persists the node again.
  #[instrument(level = "trace", skip(self), fields(run_id = %self.run_id))]
  pub async fn attach_action(&self, id: NodeId, action: NodeAction) -> Result<FlowNode> {
    let mut inner = self.lock_live("attach action").await?;
    let node = inner.graph.attach_action(id, action)?.clone();
    self.write_dirty(&mut inner).await.ok();
    if let Err(e) = inner.storage.save(&node).await {
      self.note_storage_failure(&mut inner, &e);
      return Ok(node);
    }
    if self.phase().blocks_appends() {
      // a paused run must stay fully persisted
      if let Err(e) = self.persist_safe_point(&mut inner).await {
        self.note_storage_failure(&mut inner, &e);
      }
    } else if inner.storage.is_persisted_fully() {
      if let Err(e) = self.write_clean(&mut inner).await {
        self.note_storage_failure(&mut inner, &e);
      }
    }
    Ok(node)
  }

  /// Records the program continuation at the current heads.
  ///
  /// Written to disk immediately when the policy checkpoints every suspension
  /// or the run is pausing or paused, otherwise held until the next safe point.
  #[instrument(level = "trace", skip(self, continuation), fields(run_id = %self.run_id, bytes = continuation.len()))]
  pub async fn checkpoint(&self, continuation: Vec<u8>) -> Result<()> {
    let mut inner = self.lock_live("checkpoint").await?;
    let checkpoint = ProgramCheckpoint::new(inner.graph.heads().to_vec(), continuation);
    inner.program = Some(checkpoint);
    inner.program_persisted = false;
    if self.phase().blocks_appends() {
      self.write_dirty(&mut inner).await.ok();
      if let Err(e) = self.persist_safe_point(&mut inner).await {
        self.note_storage_failure(&mut inner, &e);
        return Err(e);
      }
      return Ok(());
    }
    if !self.policy.checkpoint_every_suspension() {
      return Ok(());
    }
    self.write_dirty(&mut inner).await.ok();
    if let Err(e) = self.write_program(&mut inner).await {
      self.note_storage_failure(&mut inner, &e);
      return Err(e);
    }
    if inner.storage.is_persisted_fully() {
      self.write_clean(&mut inner).await?;
    }
    Ok(())
  }

  /// Writes everything pending: buffered nodes, the held continuation and a
  /// clean record.
  pub async fn flush(&self) -> Result<()> {
    let mut inner = self.lock_live("flush").await?;
    if inner.storage.is_persisted_fully() && inner.program_persisted && inner.disk_flag.is_clean() {
      return Ok(());
    }
    self.persist_safe_point(&mut inner).await
  }

  /// Pauses (`true`) or unpauses (`false`) the run.
  ///
  /// Pausing waits for an in-flight append, then flushes nodes and the
  /// continuation. A paused run survives any kind of termination.
  #[instrument(level = "trace", skip(self), fields(run_id = %self.run_id))]
  pub async fn pause(&self, pause: bool) -> Result<()> {
    if pause {
      self.pause_run().await
    } else {
      self.unpause_run().await
    }
  }

  async fn pause_run(&self) -> Result<()> {
    loop {
      let started = self.phase.send_if_modified(|p| match p {
        ExecutionPhase::Running | ExecutionPhase::Resuming => {
          *p = ExecutionPhase::Pausing;
          true
        }
        _ => false,
      });
      if started {
        break;
      }
      match self.phase() {
        phase if phase.is_complete() => {
          return Err(DurabilityError::InvalidState {
            phase,
            operation: "pause",
          });
        }
        ExecutionPhase::Pausing => {
          // another caller is flushing; report once it settles, or retry if it failed
          let mut rx = self.phase.subscribe();
          if rx.wait_for(|p| *p != ExecutionPhase::Pausing).await.is_err() {
            return Err(DurabilityError::InvalidState {
              phase: self.phase(),
              operation: "pause",
            });
          }
        }
        _ => return Ok(()),
      }
    }

    let mut inner = self.inner.lock().await;
    if self.phase().is_complete() {
      return Ok(());
    }
    inner.record.status = RecordStatus::Paused;
    if let Err(e) = self.persist_safe_point(&mut inner).await {
      inner.record.status = RecordStatus::Running;
      self.phase.send_replace(ExecutionPhase::Running);
      self.note_storage_failure(&mut inner, &e);
      return Err(e);
    }
    if inner.storage_error.is_some() {
      // the paused record went out dirty; it does not guarantee anything
      warn!(run_id = %self.run_id, "paused after an earlier storage failure");
    }
    self.phase.send_replace(ExecutionPhase::Paused);
    info!(run_id = %self.run_id, "execution paused");
    Ok(())
  }

  async fn unpause_run(&self) -> Result<()> {
    let mut inner = self.inner.lock().await;
    match self.phase() {
      ExecutionPhase::Paused | ExecutionPhase::Pausing => {}
      phase if phase.is_complete() => {
        return Err(DurabilityError::InvalidState {
          phase,
          operation: "unpause",
        });
      }
      _ => return Ok(()),
    }
    inner.record.status = RecordStatus::Running;
    let flag = inner.disk_flag;
    if let Err(e) = self.write_record(&mut inner, flag).await {
      self.note_storage_failure(&mut inner, &e);
    }
    self.phase.send_replace(ExecutionPhase::Running);
    info!(run_id = %self.run_id, "execution unpaused");
    Ok(())
  }

  /// Ends the run: appends the `FlowEnd` after every head, flushes, archives the
  /// record with the result, discards the continuation and releases the
  /// executor.
  #[instrument(level = "trace", skip(self), fields(run_id = %self.run_id))]
  pub async fn finish(&self, outcome: StepOutcome) -> Result<FlowNode> {
    let mut inner = self.lock_unpaused("finish").await?;
    let mut actions = Vec::new();
    if let StepOutcome::Error(message) = &outcome {
      actions.push(NodeAction::error(message.clone()));
    }
    let parents = inner.graph.heads().to_vec();
    let end = match self.append_to_graph(&mut inner, NodeKind::FlowEnd, &parents, FLOW_END_NAME, actions) {
      Ok(end) => end,
      Err(e) => {
        if e.is_integrity_failure() {
          self.close_as_failed(&mut inner, &e.to_string()).await;
        }
        return Err(e);
      }
    };
    self.complete(&mut inner, &[end.clone()], outcome.run_result()).await;
    Ok(end)
  }

  /// Closes the graph as failed, synthesizing ends for open blocks. Used by
  /// recovery for runs that cannot resume.
  pub(crate) async fn fail(&self, reason: &str) -> Result<()> {
    let mut inner = self.inner.lock().await;
    if self.phase().is_complete() {
      return Ok(());
    }
    self.close_as_failed(&mut inner, reason).await;
    Ok(())
  }

  /// Flushes everything and leaves a clean record so the run can resume after
  /// a restart. Further mutations are still accepted.
  pub async fn shutdown(&self) -> Result<()> {
    let mut inner = self.inner.lock().await;
    if self.phase().is_complete() {
      return Ok(());
    }
    self.persist_safe_point(&mut inner).await?;
    info!(run_id = %self.run_id, "execution shut down cleanly");
    Ok(())
  }

  /// True when everything mutated so far is on stable storage.
  pub async fn is_persisted_fully(&self) -> bool {
    let inner = self.inner.lock().await;
    inner.storage_error.is_none()
      && inner.storage.is_persisted_fully()
      && inner.program_persisted
      && inner.disk_flag.is_clean()
  }

  /// Current head nodes in head order.
  pub async fn current_heads(&self) -> Vec<FlowNode> {
    let inner = self.inner.lock().await;
    inner.graph.head_nodes().into_iter().cloned().collect()
  }

  pub async fn node(&self, id: NodeId) -> Result<FlowNode> {
    let inner = self.inner.lock().await;
    inner.graph.get(id).cloned()
  }

  /// Every reachable node, depth-first from the heads.
  pub async fn all_nodes(&self) -> Vec<FlowNode> {
    self
      .with_graph(|g| g.all_nodes().cloned().collect())
      .await
  }

  /// Runs `f` against the graph while holding the controller lock; use it for
  /// lazy scans that should not copy the graph.
  pub async fn with_graph<R>(&self, f: impl FnOnce(&FlowGraph) -> R) -> R {
    let inner = self.inner.lock().await;
    f(&inner.graph)
  }

  /// The continuation held in memory (persisted or not).
  pub async fn program(&self) -> Option<ProgramCheckpoint> {
    self.inner.lock().await.program.clone()
  }

  /// The persisted record as last known to this controller.
  pub async fn record(&self) -> ExecutionRecord {
    self.inner.lock().await.record.clone()
  }

  /// Enters `Resuming` before the resumer reinstalls the program. A paused run
  /// stays `Paused`, so whatever the reinstalled program appends waits for an
  /// unpause.
  pub(crate) fn begin_resume(&self) {
    self.phase.send_if_modified(|p| {
      if *p == ExecutionPhase::Running {
        *p = ExecutionPhase::Resuming;
        true
      } else {
        false
      }
    });
  }

  /// Leaves `Resuming` for `Running`. A run that stayed paused, or that the
  /// resumer already drove to completion, is left alone.
  pub(crate) fn complete_resume(&self) {
    self.phase.send_if_modified(|p| {
      if *p == ExecutionPhase::Resuming {
        *p = ExecutionPhase::Running;
        true
      } else {
        false
      }
    });
    info!(run_id = %self.run_id, phase = %self.phase(), "execution resumed");
  }

  async fn lock_live(&self, operation: &'static str) -> Result<MutexGuard<'_, Inner>> {
    let inner = self.inner.lock().await;
    let phase = self.phase();
    if phase.is_complete() {
      return Err(DurabilityError::InvalidState { phase, operation });
    }
    Ok(inner)
  }

  /// Locks once the run is neither pausing nor paused.
  async fn lock_unpaused(&self, operation: &'static str) -> Result<MutexGuard<'_, Inner>> {
    let mut rx = self.phase.subscribe();
    loop {
      if rx.wait_for(|p| !p.blocks_appends()).await.is_err() {
        return Err(DurabilityError::InvalidState {
          phase: self.phase(),
          operation,
        });
      }
      let inner = self.lock_live(operation).await?;
      if !self.phase().blocks_appends() {
        return Ok(inner);
      }
      // a pause began between the wake-up and the lock
      drop(inner);
    }
  }

  fn append_to_graph(
    &self,
    inner: &mut Inner,
    kind: NodeKind,
    parents: &[NodeId],
    name: &str,
    actions: Vec<NodeAction>,
  ) -> Result<FlowNode> {
    let node = inner.graph.append(kind, parents, name)?;
    let timed = actions.iter().any(|a| matches!(a, NodeAction::Timing { .. }));
    if kind.is_step() && !timed {
      inner.graph.attach_action(node.id(), NodeAction::timing_now())?;
    }
    for action in actions {
      inner.graph.attach_action(node.id(), action)?;
    }
    Ok(inner.graph.get(node.id())?.clone())
  }

  /// Saves `node`, and the block start it closes (which gained a `BlockEnd`).
  async fn save_node(&self, inner: &mut Inner, node: &FlowNode) -> Result<()> {
    inner.storage.save(node).await?;
    if let Some(start) = node.kind().closes() {
      let start = inner.graph.get(start)?.clone();
      inner.storage.save(&start).await?;
    }
    Ok(())
  }

  /// Marks the record dirty on disk before a mutation, once per dirty period.
  async fn write_dirty(&self, inner: &mut Inner) -> Result<()> {
    if inner.disk_flag == CleanFlag::Dirty {
      return Ok(());
    }
    let result = self.write_record(inner, CleanFlag::Dirty).await;
    if let Err(e) = &result {
      self.note_storage_failure(inner, e);
    }
    result
  }

  /// Records the current heads as durably persisted.
  async fn write_clean(&self, inner: &mut Inner) -> Result<()> {
    let flag = if inner.storage_error.is_some() {
      CleanFlag::Dirty
    } else {
      CleanFlag::Clean
    };
    inner.record.heads = inner.graph.heads().to_vec();
    self.write_record(inner, flag).await
  }

  async fn write_record(&self, inner: &mut Inner, flag: CleanFlag) -> Result<()> {
    inner.record.clean = flag;
    inner.record.touch();
    let record = inner.record.clone();
    let dir = self.run_dir.clone();
    let atomic = self.policy.atomic_writes();
    blocking(move || record_io::save_record(&dir, &record, atomic)).await?;
    inner.disk_flag = flag;
    Ok(())
  }

  async fn write_program(&self, inner: &mut Inner) -> Result<()> {
    let Some(program) = inner.program.clone() else {
      return Ok(());
    };
    let dir = self.run_dir.clone();
    let atomic = self.policy.atomic_writes();
    blocking(move || record_io::save_program(&dir, &program, atomic)).await?;
    inner.program_persisted = true;
    Ok(())
  }

  /// Flushes nodes and the held continuation, then writes a clean record.
  async fn persist_safe_point(&self, inner: &mut Inner) -> Result<()> {
    inner.storage.flush().await?;
    if !inner.program_persisted {
      self.write_program(inner).await?;
    }
    self.write_clean(inner).await
  }

  fn note_storage_failure(&self, inner: &mut Inner, e: &DurabilityError) {
    error!(run_id = %self.run_id, error = %e, "storage write failed, run stays dirty");
    inner.record.clean = CleanFlag::Dirty;
    if inner.storage_error.is_none() {
      inner.storage_error = Some(e.to_string());
    }
  }

  /// Applies a repair plan and completes the run as failed.
  async fn close_as_failed(&self, inner: &mut Inner, reason: &str) {
    let plan = repair::plan_repair(&inner.graph, reason);
    let appended = match plan.apply(&mut inner.graph) {
      Ok(nodes) => nodes,
      Err(e) => {
        error!(run_id = %self.run_id, error = %e, "could not close graph");
        Vec::new()
      }
    };
    info!(run_id = %self.run_id, synthesized = appended.len(), reason, "closing execution as failed");
    self.complete(inner, &appended, RunResult::Failure).await;
  }

  /// Persists the final nodes and archives the record. Storage failures are
  /// logged; the run is complete in memory either way.
  async fn complete(&self, inner: &mut Inner, appended: &[FlowNode], result: RunResult) {
    let persisted: Result<()> = async {
      self.write_dirty(inner).await?;
      for node in appended {
        self.save_node(inner, node).await?;
      }
      inner.storage.flush().await?;
      inner.record.status = RecordStatus::Complete;
      inner.record.result = result;
      self.write_clean(inner).await?;
      let dir = self.run_dir.clone();
      blocking(move || record_io::remove_program(&dir)).await
    }
    .await;
    if let Err(e) = persisted {
      self.note_storage_failure(inner, &e);
    }
    inner.record.status = RecordStatus::Complete;
    inner.record.result = result;
    inner.program = None;
    inner.program_persisted = true;
    self.phase.send_replace(ExecutionPhase::Complete(result));
    self.host.release(&self.run_id);
    info!(run_id = %self.run_id, result = %result, "execution complete");
  }

  /// Starts the periodic flush of batched runs when configured. The task holds
  /// only a weak reference and ends with the run.
  fn spawn_background_flush(self: &Arc<Self>, config: &EngineConfig) {
    let Some(period) = config.bulk_flush_interval() else {
      return;
    };
    if self.policy.checkpoint_every_suspension() {
      return;
    }
    tokio::spawn(background_flush(Arc::downgrade(self), period));
  }
}

async fn background_flush(controller: Weak<ExecutionController>, period: Duration) {
  let mut ticker = tokio::time::interval(period);
  ticker.tick().await;
  loop {
    ticker.tick().await;
    let Some(controller) = controller.upgrade() else {
      break;
    };
    if controller.is_complete() {
      break;
    }
    if let Err(e) = controller.flush().await {
      warn!(run_id = %controller.run_id, error = %e, "background flush failed");
    }
  }
}
