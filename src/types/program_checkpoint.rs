//! Persisted program continuation (`program.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NodeId;

/// Opaque serialized program state plus the heads it was captured at.
///
/// Recovery only reinstalls a checkpoint whose `heads` equal the record's current
/// heads; anything else is a stale continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramCheckpoint {
  pub heads: Vec<NodeId>,
  #[serde(with = "blob_base64")]
  pub blob: Vec<u8>,
  pub taken_at: DateTime<Utc>,
}

impl ProgramCheckpoint {
  pub fn new(heads: Vec<NodeId>, blob: Vec<u8>) -> Self {
    Self {
      heads,
      blob,
      taken_at: Utc::now(),
    }
  }

  /// True if the checkpoint was captured at exactly these heads.
  pub fn matches_heads(&self, heads: &[NodeId]) -> bool {
    self.heads == heads
  }
}

mod blob_base64 {
  use base64::Engine;
  use base64::engine::general_purpose::STANDARD;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(blob: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(blob))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
      .decode(encoded.as_bytes())
      .map_err(serde::de::Error::custom)
  }
}
