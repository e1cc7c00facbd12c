//! Immediate-write storage: one JSON file per node.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{instrument, warn};

use super::atomic::{blocking, read_json, write_json};
use super::{LoadedNodes, NodeStorage};
use crate::error::{DurabilityError, Result};
use crate::types::{FlowNode, NodeId, StorageKind};

/// Directory (under the run directory) holding one file per node.
pub const NODES_DIRNAME: &str = "nodes";

/// Writes every node durably before `save` returns.
pub struct SimpleNodeStorage {
  dir: PathBuf,
  atomic: bool,
}

impl SimpleNodeStorage {
  /// Storage rooted at `run_dir/nodes`. `atomic` selects rename-over-temp writes.
  pub fn new(run_dir: &Path, atomic: bool) -> Self {
    Self {
      dir: run_dir.join(NODES_DIRNAME),
      atomic,
    }
  }

  fn node_path(&self, id: NodeId) -> PathBuf {
    self.dir.join(format!("{}.json", id))
  }
}

#[async_trait]
impl NodeStorage for SimpleNodeStorage {
  #[instrument(level = "trace", skip(self, node), fields(node_id = %node.id()))]
  async fn save(&mut self, node: &FlowNode) -> Result<()> {
    let path = self.node_path(node.id());
    let node = node.clone();
    let atomic = self.atomic;
    blocking(move || write_json(&path, &node, atomic)).await
  }

  async fn load(&self, id: NodeId) -> Result<FlowNode> {
    let path = self.node_path(id);
    blocking(move || {
      if !path.exists() {
        return Err(DurabilityError::NotFound(id));
      }
      read_json(&path)
    })
    .await
  }

  async fn load_all(&self) -> Result<LoadedNodes> {
    let dir = self.dir.clone();
    blocking(move || {
      let mut loaded = LoadedNodes::default();
      let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(loaded),
        Err(e) => return Err(e.into()),
      };
      for entry in entries {
        let path = match entry {
          Ok(entry) => entry.path(),
          Err(e) => {
            loaded.failures.push((dir.display().to_string(), e.to_string()));
            continue;
          }
        };
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
          continue;
        }
        match read_json::<FlowNode>(&path) {
          Ok(node) => loaded.nodes.push(node),
          Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable flow node");
            loaded.failures.push((path.display().to_string(), e.to_string()));
          }
        }
      }
      loaded.nodes.sort_by_key(|n| n.id());
      Ok(loaded)
    })
    .await
  }

  async fn flush(&mut self) -> Result<()> {
    Ok(())
  }

  fn is_persisted_fully(&self) -> bool {
    true
  }

  fn kind(&self) -> StorageKind {
    StorageKind::Immediate
  }
}
