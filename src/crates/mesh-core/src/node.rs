//! Node runtime: turns an executor into a uniform streaming unit.
//!
//! Uses an explicit tagged union between agent and nested-orchestrator
//! executors rather than runtime type-branching, so adding a new executor
//! kind is a compile-time match exhaustiveness check.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use mesh_events::{MultiAgentEvent, NodeResult, NodeStatus, NodeType, TokenAccumulator};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agent::{Agent, AgentSnapshot, StopReason};
use crate::error::{OrchestratorError, Result};

/// A nested orchestrator, addressable as a node executor in its own right.
/// Its events are forwarded as the inner payload of this node's
/// `multiAgentNodeStreamEvent`s, and its terminal result becomes this
/// node's [`NodeResult`].
#[async_trait]
pub trait NestedOrchestrator: Send + Sync {
    async fn stream(&self, input: Value, tx: mpsc::Sender<MultiAgentEvent>) -> Result<MultiAgentEvent>;
}

/// The thing a node wraps: either an agent or an orchestrator.
///
/// Modeled as `Executor = Agent(A) | Nested(Orchestrator)` with explicit
/// match arms in the node runtime, rather than an
/// `Arc<dyn NodeExecutor>` trait-object-per-node-spec dispatch.
#[derive(Clone)]
pub enum Executor {
    Agent(Arc<dyn Agent>),
    Nested(Arc<dyn NestedOrchestrator>),
}

impl Executor {
    pub fn node_type(&self) -> NodeType {
        match self {
            Executor::Agent(_) => NodeType::Agent,
            Executor::Nested(_) => NodeType::Nested,
        }
    }
}

/// An item yielded by [`NodeRuntime::stream`] — a lazy sequence that both
/// yields intermediate events and returns a final result, rendered as a
/// channel of `Item | Done | Err` values.
pub enum NodeStreamItem {
    Event(MultiAgentEvent),
    Done(NodeResult),
    Err(OrchestratorError),
}

/// Lifecycle-managed wrapper around an [`Executor`].
///
/// The node's initial snapshot is immutable for the orchestrator's
/// lifetime; `reset_on_revisit` restores the executor to it rather than
/// mutating it.
pub struct NodeRuntime {
    pub node_id: String,
    pub executor: Executor,
    initial_snapshot: Option<AgentSnapshot>,
    pub status: NodeStatus,
    pub execution_count: u32,
}

impl NodeRuntime {
    pub fn new(node_id: impl Into<String>, executor: Executor) -> Self {
        let initial_snapshot = match &executor {
            Executor::Agent(agent) => Some(agent.snapshot()),
            Executor::Nested(_) => None,
        };
        Self {
            node_id: node_id.into(),
            executor,
            initial_snapshot,
            status: NodeStatus::Pending,
            execution_count: 0,
        }
    }

    /// Restores the executor to its immutable initial snapshot and clears
    /// completed status — used by `reset_on_revisit` (graph) only.
    pub async fn reset_to_initial_snapshot(&mut self) {
        if let (Executor::Agent(agent), Some(snapshot)) = (&self.executor, &self.initial_snapshot) {
            agent.restore(snapshot.clone()).await;
        }
        self.status = NodeStatus::Pending;
    }

    /// Streams the node's events onto `tx`, measuring start-to-finish
    /// duration, and returns the terminal [`NodeResult`]. For an agent
    /// executor, the agent's state is snapshotted on entry and restored on
    /// exit so the invocation is side-effect-free on the shared agent.
    /// Failures are preserved in the returned `NodeResult` rather than
    /// swallowed — callers (graph) re-raise after emitting the stop event.
    pub async fn stream(
        &mut self,
        input: Value,
        tx: mpsc::Sender<MultiAgentEvent>,
    ) -> NodeResult {
        let start = Instant::now();
        self.status = NodeStatus::Executing;
        self.execution_count += 1;

        let _ = tx
            .send(MultiAgentEvent::NodeStart {
                node_id: self.node_id.clone(),
                node_type: self.executor.node_type(),
            })
            .await;
        let _ = tx
            .send(MultiAgentEvent::NodeInput { node_id: self.node_id.clone(), input: input.clone() })
            .await;

        let outcome = match &self.executor {
            Executor::Agent(agent) => self.run_agent(agent.clone(), input, tx.clone()).await,
            Executor::Nested(nested) => self.run_nested(nested.clone(), input, tx.clone()).await,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(mut result) => {
                result.duration_ms = duration_ms;
                result.execution_count = self.execution_count;
                result
            }
            Err(err) => NodeResult {
                status: NodeStatus::Failed,
                duration_ms,
                content: None,
                accumulated_usage: TokenAccumulator::default(),
                accumulated_metrics: Default::default(),
                execution_count: self.execution_count,
                interrupts: Vec::new(),
                error: Some(err.to_string()),
            },
        };

        self.status = result.status;
        let _ = tx
            .send(MultiAgentEvent::NodeStop { node_id: self.node_id.clone(), node_result: result.clone() })
            .await;
        result
    }

    async fn run_agent(
        &self,
        agent: Arc<dyn Agent>,
        input: Value,
        tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<NodeResult> {
        let snapshot = agent.snapshot();
        let (agent_tx, mut agent_rx) = mpsc::channel(64);
        let forward_node_id = self.node_id.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = agent_rx.recv().await {
                let wrapped = MultiAgentEvent::NodeStream { node_id: forward_node_id.clone(), event };
                if tx.send(wrapped).await.is_err() {
                    break;
                }
            }
        });

        let stream_result = agent.stream(input, agent_tx).await;
        let _ = forward.await;
        agent.restore(snapshot).await;

        let agent_result = stream_result?;
        let status = if !agent_result.interrupts.is_empty() {
            NodeStatus::Interrupted
        } else if agent_result.stop_reason == StopReason::StreamIncomplete {
            NodeStatus::Failed
        } else {
            NodeStatus::Completed
        };

        Ok(NodeResult {
            status,
            duration_ms: 0,
            content: agent_result.content,
            accumulated_usage: agent_result.accumulated_usage,
            accumulated_metrics: Default::default(),
            execution_count: 0,
            interrupts: agent_result.interrupts,
            error: None,
        })
    }

    async fn run_nested(
        &self,
        nested: Arc<dyn NestedOrchestrator>,
        input: Value,
        tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<NodeResult> {
        let (inner_tx, mut inner_rx) = mpsc::channel(64);
        let forward_node_id = self.node_id.clone();
        let outer_tx = tx.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = inner_rx.recv().await {
                let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
                let wrapped = MultiAgentEvent::NodeStream { node_id: forward_node_id.clone(), event: payload };
                if outer_tx.send(wrapped).await.is_err() {
                    break;
                }
            }
        });

        let terminal = nested.stream(input, inner_tx).await;
        let _ = forward.await;
        let terminal = terminal?;

        match terminal {
            MultiAgentEvent::Result { result } => Ok(NodeResult {
                status: if result.status.is_terminal() && result.status == mesh_events::RunStatus::Completed {
                    NodeStatus::Completed
                } else {
                    NodeStatus::Failed
                },
                duration_ms: 0,
                content: result.text.clone().map(Value::String),
                accumulated_usage: result.usage,
                accumulated_metrics: Default::default(),
                execution_count: 0,
                interrupts: Vec::new(),
                error: None,
            }),
            _ => Err(OrchestratorError::NodeExecution {
                node: self.node_id.clone(),
                source: "nested orchestrator did not terminate with a result event".to_string(),
            }),
        }
    }
}
