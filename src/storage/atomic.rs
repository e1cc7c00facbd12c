//! File writes with optional write-to-temporary-then-rename discipline.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::error::{DurabilityError, Result};

/// Writes `bytes` to `path`, creating the parent directory if needed.
///
/// With `atomic`, the bytes go to a temporary file in the same directory which is
/// synced and then renamed over `path`; readers see either the old or the new
/// content, never a prefix. Without it the file is truncated and rewritten in place.
#[instrument(level = "trace", skip(bytes), fields(len = bytes.len()))]
pub fn write_file(path: &Path, bytes: &[u8], atomic: bool) -> std::io::Result<()> {
  let parent = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(parent)?;
  if atomic {
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    sync_dir(parent)?;
  } else {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
  }
  Ok(())
}

/// Makes a rename inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
  File::open(dir)?.sync_all()
}

/// Directories cannot be opened for syncing here; the rename is as durable as
/// the platform makes it.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
  Ok(())
}

/// Serializes `value` as pretty JSON and writes it with [write_file].
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, atomic: bool) -> Result<()> {
  let json = serde_json::to_vec_pretty(value)?;
  write_file(path, &json, atomic).map_err(|e| {
    DurabilityError::StorageWrite(format!("{}: {}", path.display(), e))
  })
}

/// Reads and parses a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let bytes = fs::read(path)?;
  Ok(serde_json::from_slice(&bytes)?)
}

/// Runs blocking file IO off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
  F: FnOnce() -> Result<T> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| DurabilityError::StorageWrite(format!("blocking io task failed: {}", e)))?
}
