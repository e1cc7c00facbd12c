//! Tri-state clean-persistence flag.

use serde::{Deserialize, Serialize};

/// Whether the last mutation of a run is known to be durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanFlag {
  /// Never set: no mutation has been confirmed yet.
  #[default]
  Unknown,
  /// The last mutation was flushed to stable storage.
  Clean,
  /// A mutation happened that is not guaranteed to be on disk.
  Dirty,
}

impl CleanFlag {
  pub fn is_clean(self) -> bool {
    matches!(self, CleanFlag::Clean)
  }
}
