//! # mesh-core — orchestration core for swarm, graph, and single-agent runs
//!
//! This crate owns the three run topologies described by the system
//! overview: a single agent, a swarm of agents that hand off turns to
//! each other, and a graph of nodes wired by data-dependency edges. All
//! three are built from the same primitives:
//!
//! - [`agent::Agent`] — the opaque conversational unit a node wraps.
//! - [`node::NodeRuntime`] — lifecycle wrapper turning an [`node::Executor`]
//!   (agent or nested orchestrator) into a uniform stream of events plus a
//!   terminal [`mesh_events::NodeResult`].
//! - [`merge::FanInMerger`] — bounded fan-in queue multiplexing concurrent
//!   node event streams with cancellation-aware polling.
//! - [`interrupt::InterruptState`] — the pause/resume protocol shared by
//!   both swarm and graph runs.
//! - [`swarm::SwarmOrchestrator`] / [`graph::GraphOrchestrator`] — the two
//!   concrete run loops.
//! - [`orchestrator::Orchestrator`] — the union the server drives, plus the
//!   adapter that lets a run act as another run's nested node.

pub mod agent;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod merge;
pub mod messages;
pub mod node;
pub mod orchestrator;
pub mod swarm;

pub use agent::{Agent, AgentResult, AgentSnapshot, StopReason};
pub use error::{OrchestratorError, Result};
pub use graph::{ConditionRegistry, GraphLimits, GraphOrchestrator};
pub use interrupt::{
    InterruptOrigin, InterruptState, InternalState, NodeInterruptContext, OrchestratorCheckpoint,
};
pub use merge::{FanInMerger, MergeItem, MergePoll};
pub use messages::{Message, MessageRole, ToolCall};
pub use node::{Executor, NestedOrchestrator, NodeRuntime, NodeStreamItem};
pub use orchestrator::{NestedOrchestratorHandle, Orchestrator};
pub use swarm::{
    BeforeNodeCallHook, BeforeNodeCallOutcome, HandoffRequest, NoopHook, SwarmLimits,
    SwarmOrchestrator, COORDINATION_TOOL_NAME,
};
