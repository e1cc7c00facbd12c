//! Startup recovery: decide for every persisted, incomplete run whether it resumes
//! or is closed as failed.
//!
//! A run resumes only when all of these hold:
//!
//! - it was paused with a clean record, or the process terminated cleanly (or the
//!   run's hint survives a dirty kill) and the record is clean;
//! - its recorded heads load;
//! - a program checkpoint exists, decodes, and was taken at exactly those heads;
//! - the [ProgramResumer] accepts the continuation.
//!
//! Anything else is repaired: open blocks are closed with synthesized ends and a
//! failing `FlowEnd` completes the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::controller::{ExecutionController, LoadReport};
use crate::error::{DurabilityError, Result};
use crate::host::{ExecutorHost, ProgramResumer, TerminationMode};
use crate::record_io;
use crate::storage::atomic::blocking;
use crate::types::{ExecutionRecord, ProgramCheckpoint};

/// What recovery did with one run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
  /// The program was reinstalled and the run continues.
  Resumed,
  /// The run could not continue and was completed as a failure. `reason` is
  /// the rendered [DurabilityError::Unresumable].
  Failed { reason: String },
  /// Nothing to do (complete, already claimed) or the run could not be opened.
  Skipped { reason: String },
}

/// Per-run result of a recovery pass.
#[derive(Debug)]
pub struct RecoveryReport {
  pub run_dir: PathBuf,
  /// Run id, or the directory name when the record could not be read.
  pub run_id: String,
  pub outcome: RecoveryOutcome,
  /// The reopened run, unless it could not be opened.
  pub execution: Option<Arc<ExecutionController>>,
}

fn unresumable(record: &ExecutionRecord, reason: impl Into<String>) -> DurabilityError {
  DurabilityError::Unresumable {
    run_id: record.run_id.clone(),
    reason: reason.into(),
  }
}

/// Record-level part of the resume decision.
///
/// Returns [DurabilityError::Unresumable] with the reason the run cannot resume,
/// or `Ok` if the record allows it.
pub fn assess_record(record: &ExecutionRecord, termination: TerminationMode) -> Result<()> {
  if record.is_paused() {
    return if record.clean.is_clean() {
      Ok(())
    } else {
      Err(unresumable(record, "paused without a clean flush"))
    };
  }
  if termination == TerminationMode::Dirty && !record.hint.survives_dirty_kill() {
    return Err(unresumable(
      record,
      format!("{} run did not survive an uncontrolled termination", record.hint),
    ));
  }
  if !record.clean.is_clean() {
    return Err(unresumable(
      record,
      format!("last mutation was not durably persisted ({:?})", record.clean),
    ));
  }
  Ok(())
}

/// Checks the loaded graph and continuation against the record.
fn assess_load(
  record: &ExecutionRecord,
  report: &LoadReport,
  program: Option<&ProgramCheckpoint>,
) -> Result<()> {
  if !report.unresolved_heads.is_empty() {
    return Err(unresumable(
      record,
      format!("head nodes {:?} could not be loaded", report.unresolved_heads),
    ));
  }
  if let Some(e) = &report.program_error {
    return Err(unresumable(record, e.clone()));
  }
  let Some(program) = program else {
    return Err(unresumable(record, "no program checkpoint"));
  };
  if !program.matches_heads(&record.heads) {
    return Err(unresumable(
      record,
      format!(
        "program checkpoint taken at {:?} but heads are {:?}",
        program.heads, record.heads
      ),
    ));
  }
  Ok(())
}

/// Runs recovery over every run directory under a root.
pub struct RecoveryCoordinator {
  root: PathBuf,
  host: Arc<dyn ExecutorHost>,
  resumer: Arc<dyn ProgramResumer>,
  config: EngineConfig,
  /// Run directories this coordinator has already taken on.
  claimed: Mutex<HashSet<PathBuf>>,
}

impl RecoveryCoordinator {
  pub fn new(
    root: impl Into<PathBuf>,
    host: Arc<dyn ExecutorHost>,
    resumer: Arc<dyn ProgramResumer>,
    config: EngineConfig,
  ) -> Self {
    Self {
      root: root.into(),
      host,
      resumer,
      config,
      claimed: Mutex::new(HashSet::new()),
    }
  }

  /// Recovers every run under the root concurrently. Each run is handled at most
  /// once per coordinator, so overlapping passes do not resume a run twice.
  #[instrument(level = "trace", skip(self), fields(root = %self.root.display()))]
  pub async fn recover_all(&self) -> Result<Vec<RecoveryReport>> {
    let root = self.root.clone();
    let dirs = blocking(move || list_run_dirs(&root)).await?;
    info!(runs = dirs.len(), termination = ?self.host.termination(), "starting recovery pass");
    let reports = join_all(dirs.iter().map(|dir| self.recover_run(dir))).await;
    for report in &reports {
      info!(run_id = %report.run_id, outcome = ?report.outcome, "recovered run");
    }
    Ok(reports)
  }

  /// Recovers one run directory.
  pub async fn recover_run(&self, run_dir: &Path) -> RecoveryReport {
    let fallback_id = run_dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| run_dir.display().to_string());
    let skipped = |reason: String, run_id: String| RecoveryReport {
      run_dir: run_dir.to_path_buf(),
      run_id,
      outcome: RecoveryOutcome::Skipped { reason },
      execution: None,
    };

    if !self.claim(run_dir) {
      return skipped("already claimed by this recovery".to_string(), fallback_id);
    }

    let (execution, report) =
      match ExecutionController::open_with_report(run_dir, &self.config, self.host.clone()).await {
        Ok(opened) => opened,
        Err(e) => {
          error!(run_dir = %run_dir.display(), error = %e, "cannot open run");
          self.host.release(&fallback_id);
          return skipped(e.to_string(), fallback_id);
        }
      };
    let run_id = execution.run_id().to_string();
    if !report.node_failures.is_empty() {
      warn!(run_id = %run_id, unreadable = report.node_failures.len(), "recovering with unreadable node data");
    }
    if execution.is_complete() {
      return RecoveryReport {
        execution: Some(execution),
        ..skipped("already complete".to_string(), run_id)
      };
    }

    let outcome = match self.try_resume(&execution, &report).await {
      Ok(()) => RecoveryOutcome::Resumed,
      Err(e) => {
        let reason = e.to_string();
        warn!(run_id = %run_id, error = %e, "run cannot resume, closing as failed");
        if let Err(e) = execution.fail(&reason).await {
          error!(run_id = %run_id, error = %e, "could not close run");
        }
        RecoveryOutcome::Failed { reason }
      }
    };
    RecoveryReport {
      run_dir: run_dir.to_path_buf(),
      run_id,
      outcome,
      execution: Some(execution),
    }
  }

  async fn try_resume(
    &self,
    execution: &Arc<ExecutionController>,
    report: &LoadReport,
  ) -> Result<()> {
    let record = execution.record().await;
    assess_record(&record, self.host.termination())?;
    let program = execution.program().await;
    assess_load(&record, report, program.as_ref())?;
    let Some(program) = program else {
      return Err(unresumable(&record, "no program checkpoint"));
    };

    execution.begin_resume();
    if let Err(e) = self.resumer.resume(execution.clone(), &program.blob).await {
      let decode = DurabilityError::ContinuationDecode(e);
      return Err(unresumable(&record, decode.to_string()));
    }
    execution.complete_resume();
    Ok(())
  }

  fn claim(&self, run_dir: &Path) -> bool {
    match self.claimed.lock() {
      Ok(mut claimed) => claimed.insert(run_dir.to_path_buf()),
      Err(_) => false,
    }
  }
}

/// Run directories directly under `root`, sorted. A missing root has none.
pub fn list_run_dirs(root: &Path) -> Result<Vec<PathBuf>> {
  let entries = match std::fs::read_dir(root) {
    Ok(entries) => entries,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e.into()),
  };
  let mut dirs = Vec::new();
  for entry in entries {
    let path = entry?.path();
    if path.is_dir() && record_io::is_run_dir(&path) {
      dirs.push(path);
    }
  }
  dirs.sort();
  Ok(dirs)
}
