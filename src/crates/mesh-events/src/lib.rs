//! Event union and data model shared by every orchestrator topology.
//!
//! This crate has no async runtime dependency and no orchestration logic of
//! its own — it is the leaf of the dependency graph (`mesh-core`,
//! `mesh-checkpoint`, and `mesh-server` all depend on it, never the reverse).

pub mod event;
pub mod extract;
pub mod model;
pub mod usage;

pub use event::{MultiAgentEvent, NodeType};
pub use model::{
    AgentSpec, GraphEdge, Node, NodeResult, NodeStatus, Run, RunMetrics, RunMode, RunResult,
    RunStatus, SharedContext, TokenAccumulator, ToolUseGuardState,
};
pub use usage::{Counter, DeltaWindow, ModelUsageTable, apply_delta, fold_run_scoped_total, normalize_model_id};
