//! Batched-write storage: the whole node list in one JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::atomic::{blocking, read_json, write_json};
use super::{LoadedNodes, NodeStorage};
use crate::error::{DurabilityError, Result};
use crate::types::{FlowNode, NodeId, StorageKind};

/// File (under the run directory) holding every node of a batched run.
pub const BULK_NODES_FILENAME: &str = "nodes.json";

/// Buffers nodes in memory and writes them all on [NodeStorage::flush].
pub struct BulkNodeStorage {
  path: PathBuf,
  nodes: BTreeMap<NodeId, FlowNode>,
  unflushed: usize,
  load_failure: Option<String>,
}

impl BulkNodeStorage {
  /// Opens the storage of `run_dir`, reading any previously flushed nodes.
  ///
  /// An unreadable node file does not fail the open: the storage starts empty and
  /// the failure is reported by [NodeStorage::load_all].
  pub async fn open(run_dir: &Path) -> Result<Self> {
    let path = run_dir.join(BULK_NODES_FILENAME);
    let read_path = path.clone();
    let existing = blocking(move || {
      if !read_path.exists() {
        return Ok(Ok(Vec::new()));
      }
      Ok(read_json::<Vec<FlowNode>>(&read_path).map_err(|e| e.to_string()))
    })
    .await?;
    let (nodes, load_failure) = match existing {
      Ok(nodes) => (nodes, None),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "unreadable node list, starting empty");
        (Vec::new(), Some(e))
      }
    };
    Ok(Self {
      path,
      nodes: nodes.into_iter().map(|n| (n.id(), n)).collect(),
      unflushed: 0,
      load_failure,
    })
  }

  /// Number of saves not yet written.
  pub fn unflushed(&self) -> usize {
    self.unflushed
  }
}

#[async_trait]
impl NodeStorage for BulkNodeStorage {
  async fn save(&mut self, node: &FlowNode) -> Result<()> {
    self.nodes.insert(node.id(), node.clone());
    self.unflushed += 1;
    Ok(())
  }

  async fn load(&self, id: NodeId) -> Result<FlowNode> {
    self
      .nodes
      .get(&id)
      .cloned()
      .ok_or(DurabilityError::NotFound(id))
  }

  async fn load_all(&self) -> Result<LoadedNodes> {
    Ok(LoadedNodes {
      nodes: self.nodes.values().cloned().collect(),
      failures: self
        .load_failure
        .iter()
        .map(|e| (self.path.display().to_string(), e.clone()))
        .collect(),
    })
  }

  #[instrument(level = "trace", skip(self), fields(unflushed = self.unflushed))]
  async fn flush(&mut self) -> Result<()> {
    if self.unflushed == 0 && self.path.exists() {
      return Ok(());
    }
    let nodes: Vec<FlowNode> = self.nodes.values().cloned().collect();
    let path = self.path.clone();
    let count = nodes.len();
    blocking(move || write_json(&path, &nodes, true)).await?;
    debug!(nodes = count, "flushed node list");
    self.unflushed = 0;
    Ok(())
  }

  fn is_persisted_fully(&self) -> bool {
    self.unflushed == 0
  }

  fn kind(&self) -> StorageKind {
    StorageKind::Batched
  }
}
