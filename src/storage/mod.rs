//! Pluggable persistence of individual flow nodes.
//!
//! Two strategies implement [NodeStorage]:
//!
//! - [SimpleNodeStorage]: one file per node, written before `save` returns.
//! - [BulkNodeStorage]: nodes buffered in memory, the whole list written on `flush`.
//!
//! Both replace on-disk units through [atomic::write_file], so a crash mid-write
//! leaves the previously committed version in place.

pub mod atomic;
#[cfg(test)]
mod atomic_test;
mod bulk;
#[cfg(test)]
mod bulk_test;
mod simple;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FlowNode, NodeId, StorageKind};

pub use bulk::{BULK_NODES_FILENAME, BulkNodeStorage};
pub use simple::{NODES_DIRNAME, SimpleNodeStorage};

/// Result of a tolerant bulk read: every node that could be read plus the units
/// that could not.
#[derive(Debug, Default)]
pub struct LoadedNodes {
  pub nodes: Vec<FlowNode>,
  /// `(unit, error)` for each file that failed to read or parse.
  pub failures: Vec<(String, String)>,
}

/// Persistence strategy for the nodes of one execution.
///
/// After `save` (immediate storage) or `flush` (batched storage) returns `Ok`, a
/// later `load` returns a value at least as new, even across a crash.
#[async_trait]
pub trait NodeStorage: Send + Sync {
  /// Stores a new or updated node (e.g. after an action was attached).
  async fn save(&mut self, node: &FlowNode) -> Result<()>;

  /// Loads one node. Missing nodes are [crate::DurabilityError::NotFound].
  async fn load(&self, id: NodeId) -> Result<FlowNode>;

  /// Loads every readable node in id order; read failures are reported, not fatal.
  async fn load_all(&self) -> Result<LoadedNodes>;

  /// Writes anything buffered to stable storage.
  async fn flush(&mut self) -> Result<()>;

  /// True when nothing saved is waiting to be written.
  fn is_persisted_fully(&self) -> bool;

  fn kind(&self) -> StorageKind;
}
