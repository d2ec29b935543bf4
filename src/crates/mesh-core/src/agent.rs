//! The `Agent` capability the orchestrator core treats as opaque.
//!
//! An agent is a named unit with a model binding, a system prompt, a tool
//! list, and an optional session binding. The core only needs three things
//! from it: a lazy `stream`, a snapshot/restore pair for side-effect-free
//! node invocation, and a tool registry.

use std::sync::Arc;

use async_trait::async_trait;
use mesh_events::TokenAccumulator;
use mesh_tools::ToolRegistry;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::messages::Message;

/// Why an agent's stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    /// The provider stream ended before an aggregated result arrived —
    /// surfaces upstream as `MODEL_STREAM_INCOMPLETE`.
    StreamIncomplete,
}

/// The terminal aggregated result an agent's `stream` resolves to.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub stop_reason: StopReason,
    pub content: Option<Value>,
    pub accumulated_usage: TokenAccumulator,
    pub interrupts: Vec<Value>,
}

/// An agent's mutable state, snapshotted on node entry and restored on
/// exit so invocation is side-effect-free on the wrapped agent.
#[derive(Debug, Clone, Default)]
pub struct AgentSnapshot {
    pub messages: Vec<Message>,
    pub scratch_state: Value,
}

/// Opaque conversational unit wrapped by a node.
///
/// Implementations are expected to guard their mutable state behind
/// interior mutability (e.g. a `tokio::sync::Mutex`) since a single `Agent`
/// instance may be shared across a swarm roster and invoked by only one
/// node at a time (at-most-one-active-invocation-per-agent).
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn tools(&self) -> Arc<dyn ToolRegistry>;

    /// Streams agent-internal events onto `tx` and resolves to the
    /// terminal aggregated result once the provider stream ends.
    async fn stream(&self, input: Value, tx: mpsc::Sender<Value>) -> Result<AgentResult>;

    fn snapshot(&self) -> AgentSnapshot;

    async fn restore(&self, snapshot: AgentSnapshot);
}
