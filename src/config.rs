//! Engine configuration: defaults, JSON file, environment overrides.
//!
//! Environment variables override file values:
//!
//! - `FLOW_DURABILITY_HINT`: default hint for runs that do not set one
//!   (`max-survivability`, `survivable-nonatomic`, `performance-optimized`).
//! - `FLOW_BULK_FLUSH_INTERVAL_MS`: period of the background flush for batched
//!   runs; `0` disables it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{DurabilityError, Result};
use crate::storage::atomic::read_json;
use crate::types::DurabilityHint;

pub const ENV_DURABILITY_HINT: &str = "FLOW_DURABILITY_HINT";
pub const ENV_BULK_FLUSH_INTERVAL_MS: &str = "FLOW_BULK_FLUSH_INTERVAL_MS";

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Hint used when a run does not request one.
  pub default_hint: DurabilityHint,
  /// Background flush period for batched storage, in milliseconds. `None` means
  /// batched runs only flush at safe points.
  pub bulk_flush_interval_ms: Option<u64>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_hint: DurabilityHint::MaxSurvivability,
      bulk_flush_interval_ms: None,
    }
  }
}

impl EngineConfig {
  /// Loads a JSON config file. Missing keys take their defaults.
  #[instrument(level = "trace")]
  pub fn load(path: &Path) -> Result<Self> {
    read_json(path).map_err(|e| DurabilityError::Config(format!("{}: {}", path.display(), e)))
  }

  /// Applies overrides from the process environment.
  pub fn with_env(self) -> Result<Self> {
    self.with_overrides(|key| std::env::var(key).ok())
  }

  /// Applies overrides from `lookup` (the environment in production, a map in tests).
  pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(hint) = lookup(ENV_DURABILITY_HINT) {
      self.default_hint = hint.parse().map_err(DurabilityError::Config)?;
    }
    if let Some(ms) = lookup(ENV_BULK_FLUSH_INTERVAL_MS) {
      let ms: u64 = ms.trim().parse().map_err(|e| {
        DurabilityError::Config(format!("{}={}: {}", ENV_BULK_FLUSH_INTERVAL_MS, ms, e))
      })?;
      self.bulk_flush_interval_ms = (ms > 0).then_some(ms);
    }
    Ok(self)
  }

  /// The hint a new run gets: its own request, else the configured default.
  pub fn resolve_hint(&self, requested: Option<DurabilityHint>) -> DurabilityHint {
    requested.unwrap_or(self.default_hint)
  }

  pub fn bulk_flush_interval(&self) -> Option<Duration> {
    self.bulk_flush_interval_ms.map(Duration::from_millis)
  }
}
