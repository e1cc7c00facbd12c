//! Data model of a durable execution: flow nodes, their actions, the persisted
//! execution record and the program checkpoint.
//!
//! Everything here is plain data with serde support; the behaviour lives in
//! [crate::graph], [crate::storage] and [crate::controller].

mod clean_flag;
mod durability_hint;
#[cfg(test)]
mod durability_hint_test;
mod execution_phase;
mod execution_record;
mod flow_node;
mod node_action;
mod node_id;
mod node_kind;
mod program_checkpoint;
mod run_result;

pub use clean_flag::CleanFlag;
pub use durability_hint::{DurabilityHint, StorageKind};
pub use execution_phase::ExecutionPhase;
pub use execution_record::{ExecutionRecord, RecordStatus};
pub use flow_node::FlowNode;
pub use node_action::{ActionKind, LogHandle, NodeAction};
pub use node_id::NodeId;
pub use node_kind::NodeKind;
pub use program_checkpoint::ProgramCheckpoint;
pub use run_result::{RunResult, StepOutcome};
