//! Interfaces to the collaborators around the durability core: the interpreter
//! that owns the program continuation, and the scheduler/executor host.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::controller::ExecutionController;

/// Filename of the marker a clean shutdown leaves under the runs root.
pub const CLEAN_SHUTDOWN_MARKER: &str = ".clean-shutdown";

/// How the previous process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationMode {
  /// Orderly shutdown: every run went through its shutdown safe point.
  Clean,
  /// The process was killed or crashed.
  Dirty,
}

/// Scheduler/executor host.
pub trait ExecutorHost: Send + Sync {
  /// How the process that last ran the executions terminated.
  fn termination(&self) -> TerminationMode;

  /// The run has terminated; no executor should be considered attached to it.
  fn release(&self, run_id: &str);
}

/// Interpreter side of a resume: rebuilds the program from its continuation and
/// reinstalls it as the live state driving `execution`.
///
/// Returning an error makes the run unresumable.
#[async_trait]
pub trait ProgramResumer: Send + Sync {
  async fn resume(
    &self,
    execution: Arc<ExecutionController>,
    continuation: &[u8],
  ) -> Result<(), String>;
}

/// Host for a single process: a marker file records clean shutdowns, and
/// releases are kept in memory for inspection.
pub struct LocalExecutorHost {
  root: PathBuf,
  termination: TerminationMode,
  released: Mutex<Vec<String>>,
}

impl LocalExecutorHost {
  /// Determines how the previous process ended by consuming the shutdown marker
  /// under `root`. A missing marker means the previous process did not shut down
  /// cleanly.
  pub fn startup(root: &Path) -> std::io::Result<Self> {
    let marker = root.join(CLEAN_SHUTDOWN_MARKER);
    let termination = match std::fs::remove_file(&marker) {
      Ok(()) => TerminationMode::Clean,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => TerminationMode::Dirty,
      Err(e) => return Err(e),
    };
    info!(root = %root.display(), termination = ?termination, "executor host started");
    Ok(Self::with_termination(root, termination))
  }

  pub fn with_termination(root: &Path, termination: TerminationMode) -> Self {
    Self {
      root: root.to_path_buf(),
      termination,
      released: Mutex::new(Vec::new()),
    }
  }

  /// Leaves the marker that makes the next [LocalExecutorHost::startup] see a
  /// clean termination. Call after every run went through its shutdown.
  pub fn mark_clean_shutdown(&self) -> std::io::Result<()> {
    crate::storage::atomic::write_file(&self.root.join(CLEAN_SHUTDOWN_MARKER), b"", true)
  }

  /// Run ids released so far, in release order.
  pub fn released(&self) -> Vec<String> {
    self
      .released
      .lock()
      .map(|r| r.clone())
      .unwrap_or_default()
  }
}

impl ExecutorHost for LocalExecutorHost {
  fn termination(&self) -> TerminationMode {
    self.termination
  }

  fn release(&self, run_id: &str) {
    debug!(run_id, "releasing executor");
    if let Ok(mut released) = self.released.lock() {
      released.push(run_id.to_string());
    }
  }
}
