//! Execution record and program checkpoint save/load in a run directory (JSON).

use std::path::Path;

use tracing::instrument;

use crate::error::{DurabilityError, Result};
use crate::storage::atomic::{read_json, write_json};
use crate::types::{ExecutionRecord, ProgramCheckpoint};

/// Filename of the execution record under a run directory.
pub const RECORD_FILENAME: &str = "execution.json";

/// Filename of the program checkpoint under a run directory.
pub const PROGRAM_FILENAME: &str = "program.json";

/// True if `dir` looks like a run directory (has an execution record).
pub fn is_run_dir(dir: &Path) -> bool {
  dir.join(RECORD_FILENAME).is_file()
}

/// Saves the execution record of `run_dir`.
#[instrument(level = "trace", skip(record), fields(run_id = %record.run_id, clean = ?record.clean))]
pub fn save_record(run_dir: &Path, record: &ExecutionRecord, atomic: bool) -> Result<()> {
  write_json(&run_dir.join(RECORD_FILENAME), record, atomic)
}

/// Loads the execution record of `run_dir`. Errors if missing or invalid.
#[instrument(level = "trace")]
pub fn load_record(run_dir: &Path) -> Result<ExecutionRecord> {
  read_json(&run_dir.join(RECORD_FILENAME))
}

/// Saves the program checkpoint of `run_dir`.
#[instrument(level = "trace", skip(checkpoint), fields(heads = ?checkpoint.heads))]
pub fn save_program(run_dir: &Path, checkpoint: &ProgramCheckpoint, atomic: bool) -> Result<()> {
  write_json(&run_dir.join(PROGRAM_FILENAME), checkpoint, atomic)
}

/// Loads the program checkpoint of `run_dir`.
///
/// `Ok(None)` when no checkpoint was ever written (or it was discarded at
/// completion); [DurabilityError::ContinuationDecode] when it cannot be read.
#[instrument(level = "trace")]
pub fn load_program(run_dir: &Path) -> Result<Option<ProgramCheckpoint>> {
  let path = run_dir.join(PROGRAM_FILENAME);
  if !path.exists() {
    return Ok(None);
  }
  read_json(&path)
    .map(Some)
    .map_err(|e| DurabilityError::ContinuationDecode(e.to_string()))
}

/// Discards the program checkpoint of a completed run.
pub fn remove_program(run_dir: &Path) -> Result<()> {
  match std::fs::remove_file(run_dir.join(PROGRAM_FILENAME)) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e.into()),
  }
}
