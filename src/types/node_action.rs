//! Actions attached to flow nodes.
//!
//! A node carries at most one action per [ActionKind]; attaching another action of
//! the same kind replaces the previous one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::NodeId;

/// Opaque reference into the external log sink. Stored and returned, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogHandle(String);

impl LogHandle {
  pub fn new(handle: impl Into<String>) -> Self {
    Self(handle.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for LogHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Discriminant of a [NodeAction].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
  Timing,
  Arguments,
  Log,
  Label,
  BlockEnd,
  Error,
  AbnormalClosure,
}

/// Metadata attached to a node, persisted together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeAction {
  /// When the step started running.
  Timing { started_at: DateTime<Utc> },
  /// Invocation arguments as supplied by the interpreter.
  Arguments { values: BTreeMap<String, String> },
  /// Log segment written while the step ran.
  Log { handle: LogHandle },
  /// Display label.
  Label { text: String },
  /// Back reference from a block start to the node that closed it.
  BlockEnd { end: NodeId },
  /// Failure detail.
  Error { message: String },
  /// The node was synthesized by recovery to close the graph of a run that could not resume.
  AbnormalClosure { reason: String },
}

impl NodeAction {
  pub fn kind(&self) -> ActionKind {
    match self {
      NodeAction::Timing { .. } => ActionKind::Timing,
      NodeAction::Arguments { .. } => ActionKind::Arguments,
      NodeAction::Log { .. } => ActionKind::Log,
      NodeAction::Label { .. } => ActionKind::Label,
      NodeAction::BlockEnd { .. } => ActionKind::BlockEnd,
      NodeAction::Error { .. } => ActionKind::Error,
      NodeAction::AbnormalClosure { .. } => ActionKind::AbnormalClosure,
    }
  }

  pub fn timing_now() -> Self {
    NodeAction::Timing {
      started_at: Utc::now(),
    }
  }

  pub fn log(handle: impl Into<String>) -> Self {
    NodeAction::Log {
      handle: LogHandle::new(handle),
    }
  }

  pub fn arguments<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: Into<String>,
    V: Into<String>,
  {
    NodeAction::Arguments {
      values: values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    NodeAction::Error {
      message: message.into(),
    }
  }
}
