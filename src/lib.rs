//! # flow-durability
//!
//! Durability core of a suspendable workflow engine: each run records its steps
//! as an append-only graph of flow nodes, persists it according to a durability
//! hint, and is either resumed or cleanly failed after the process restarts.
//!
//! ## Architecture
//!
//! - [types]: flow nodes, actions, the execution record and program checkpoint.
//! - [graph]: the in-memory DAG with its heads; [scanner] walks it lazily.
//! - [storage]: per-node files ([SimpleNodeStorage]) or one batched list
//!   ([BulkNodeStorage]).
//! - [policy]: what a [DurabilityHint] means for storage and checkpoints.
//! - [controller]: the [ExecutionController] that appends, pauses, checkpoints
//!   and finishes a run while keeping the clean-persistence flag honest.
//! - [recovery]: the [RecoveryCoordinator] that decides at startup which runs
//!   resume and closes the rest through [repair].

pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod host;
pub mod policy;
#[cfg(test)]
mod policy_test;
pub mod record_io;
pub mod recovery;
pub mod repair;
#[cfg(test)]
mod repair_test;
pub mod scanner;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use controller::{ExecutionController, NodeSpec};
pub use error::{DurabilityError, Result};
pub use graph::FlowGraph;
pub use host::{ExecutorHost, LocalExecutorHost, ProgramResumer, TerminationMode};
pub use policy::DurabilityPolicy;
pub use recovery::{RecoveryCoordinator, RecoveryOutcome, RecoveryReport};
pub use repair::{RepairPlan, plan_repair};
pub use scanner::{DepthFirstScanner, LinearScanner};
pub use storage::{BulkNodeStorage, NodeStorage, SimpleNodeStorage};
pub use types::{
  ActionKind, CleanFlag, DurabilityHint, ExecutionPhase, ExecutionRecord, FlowNode, NodeAction,
  NodeId, NodeKind, ProgramCheckpoint, RunResult, StepOutcome,
};
