//! Swarm orchestrator: self-organizing hand-off between agents.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mesh_events::{MultiAgentEvent, Node, NodeStatus, RunResult, RunStatus, SharedContext, TokenAccumulator};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::interrupt::{InterruptOrigin, InterruptState, InternalState, NodeInterruptContext, OrchestratorCheckpoint};
use crate::node::NodeRuntime;

/// A request value returned by the `handoff_to_agent` tool handler — a
/// closure-avoidance rendering of a swarm-capturing coordination tool.
/// The orchestrator applies it between turns instead of the tool mutating
/// shared state directly.
#[derive(Debug, Clone)]
pub struct HandoffRequest {
    pub target_agent: String,
    pub message: Option<String>,
    pub context: Option<BTreeMap<String, Value>>,
}

/// Continuation limits and their precedence .
#[derive(Debug, Clone)]
pub struct SwarmLimits {
    pub max_handoffs: u32,
    pub max_iterations: u32,
    pub execution_timeout: Duration,
    /// Repetitive-handoff detection window; 0 disables the check.
    pub repetitive_window: usize,
    /// Minimum distinct node ids required over the window; 0 disables.
    pub min_unique_agents: usize,
}

impl Default for SwarmLimits {
    fn default() -> Self {
        Self {
            max_handoffs: 20,
            max_iterations: 20,
            execution_timeout: Duration::from_secs(900),
            repetitive_window: 0,
            min_unique_agents: 0,
        }
    }
}

/// Hook invoked before a node's turn; may cancel the swarm or raise
/// interrupts for that node.
pub enum BeforeNodeCallOutcome {
    Proceed,
    Cancel { message: String },
    Interrupt { interrupt_ids: Vec<String> },
}

#[async_trait::async_trait]
pub trait BeforeNodeCallHook: Send + Sync {
    async fn call(&self, node_id: &str, shared_context: &SharedContext) -> BeforeNodeCallOutcome;
}

/// A hook that always proceeds — the default when no hook is configured.
pub struct NoopHook;

#[async_trait::async_trait]
impl BeforeNodeCallHook for NoopHook {
    async fn call(&self, _node_id: &str, _shared_context: &SharedContext) -> BeforeNodeCallOutcome {
        BeforeNodeCallOutcome::Proceed
    }
}

/// Self-organizing hand-off state machine.
///
/// On construction, a `handoff_to_agent` tool is (conceptually) injected
/// into every node's tool registry by the caller; this orchestrator only
/// validates that no node's own registry already has a tool by that name —
/// see [`SwarmOrchestrator::new`].
pub struct SwarmOrchestrator {
    run_id: Uuid,
    nodes: BTreeMap<String, NodeRuntime>,
    current_node: String,
    limits: SwarmLimits,
    hook: Arc<dyn BeforeNodeCallHook>,
    shared_context: SharedContext,
    node_history: Vec<String>,
    usage: TokenAccumulator,
    status: RunStatus,
    execution_time: Duration,
    interrupt_state: InterruptState,
    pending_handoff: Option<HandoffRequest>,
}

pub const COORDINATION_TOOL_NAME: &str = "handoff_to_agent";

/// An agent whose turn ends with a `handoff_to_agent` call surfaces it as
/// its result content under this key rather than through a tool registry
/// dispatch — see [`HandoffTool`](mesh_tools) for the definition shown to
/// the model.
const HANDOFF_CONTENT_KEY: &str = "handoff_to_agent";

fn extract_handoff_request(content: &Option<Value>) -> Option<HandoffRequest> {
    let obj = content.as_ref()?.as_object()?;
    let payload = obj.get(HANDOFF_CONTENT_KEY)?.as_object()?;
    let target_agent = payload.get("target_agent")?.as_str()?.to_string();
    let message = payload.get("message").and_then(Value::as_str).map(str::to_string);
    let context = payload.get("context").and_then(Value::as_object).map(|map| {
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<BTreeMap<_, _>>()
    });
    Some(HandoffRequest { target_agent, message, context })
}

/// Over the last `window` entries of node history, true iff the count of
/// distinct node ids is below `min_unique`. `window`/`min_unique` of 0
/// disables the check.
fn is_repetitive(history: &[String], window: usize, min_unique: usize) -> bool {
    if window == 0 || min_unique == 0 || history.len() < window {
        return false;
    }
    let tail = &history[history.len() - window..];
    let distinct: std::collections::HashSet<_> = tail.iter().collect();
    distinct.len() < min_unique
}

impl SwarmOrchestrator {
    /// Builds a swarm over `nodes`, starting at `entry_node`. Fails
    /// construction if any node's executor already exposes a tool named
    /// `handoff_to_agent` (the coordination tool's injected name).
    pub fn new(
        run_id: Uuid,
        nodes: Vec<NodeRuntime>,
        entry_node: impl Into<String>,
        limits: SwarmLimits,
        hook: Arc<dyn BeforeNodeCallHook>,
    ) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for node in nodes {
            if let crate::node::Executor::Agent(agent) = &node.executor {
                if agent.tools().has(COORDINATION_TOOL_NAME) {
                    return Err(OrchestratorError::ToolNameCollision {
                        node: node.node_id.clone(),
                        tool_name: COORDINATION_TOOL_NAME.to_string(),
                    });
                }
            }
            by_id.insert(node.node_id.clone(), node);
        }
        let entry_node = entry_node.into();
        if !by_id.contains_key(&entry_node) {
            return Err(OrchestratorError::Validation(format!(
                "entry node '{entry_node}' is not in the swarm roster"
            )));
        }

        Ok(Self {
            run_id,
            nodes: by_id,
            current_node: entry_node,
            limits,
            hook,
            shared_context: SharedContext::new(),
            node_history: Vec::new(),
            usage: TokenAccumulator::default(),
            status: RunStatus::Running,
            execution_time: Duration::ZERO,
            interrupt_state: InterruptState::new(),
            pending_handoff: None,
        })
    }

    /// Applies a handoff request emitted by the coordination tool: (a)
    /// validates the target, (b) stores it so the turn loop switches
    /// current node at the end of this turn, (c) merges `context` into the
    /// shared context under the *current* node's id. Never takes effect
    /// mid-stream.
    pub fn request_handoff(&mut self, request: HandoffRequest) -> Result<()> {
        if !self.nodes.contains_key(&request.target_agent) {
            return Err(OrchestratorError::UnknownHandoffTarget(request.target_agent));
        }
        if let Some(context) = &request.context {
            self.shared_context.merge(&self.current_node, context.clone());
        }
        self.pending_handoff = Some(request);
        Ok(())
    }

    fn repetitive_handoff_detected(&self) -> bool {
        is_repetitive(&self.node_history, self.limits.repetitive_window, self.limits.min_unique_agents)
    }

    fn check_continuation_limits(&self) -> Option<String> {
        if self.node_history.len() as u32 >= self.limits.max_handoffs {
            return Some(format!("maxHandoffs ({}) exceeded", self.limits.max_handoffs));
        }
        if self.node_history.len() as u32 >= self.limits.max_iterations {
            return Some(format!("maxIterations ({}) exceeded", self.limits.max_iterations));
        }
        if self.execution_time >= self.limits.execution_timeout {
            return Some(format!("executionTimeout ({:?}) exceeded", self.limits.execution_timeout));
        }
        if self.repetitive_handoff_detected() {
            return Some("repetitive handoff detected below minUniqueAgents".to_string());
        }
        None
    }

    /// Builds the text block a non-resume turn's node input is prefixed
    /// with: handoff message, original task, prior node order, shared
    /// context dump, roster, and the silence directive.
    fn build_turn_input(&self, original_task: &Value, handoff_message: Option<&str>) -> Value {
        let mut lines = Vec::new();
        if let Some(message) = handoff_message {
            lines.push(format!("Handoff message: {message}"));
        }
        if let Value::String(text) = original_task {
            lines.push(format!("Original task: {text}"));
        }
        lines.push(format!("Prior nodes (handoff order): {}", self.node_history.join(" -> ")));
        lines.push(format!("Shared context: {}", self.shared_context.dump()));
        let roster: Vec<&str> = self.nodes.keys().map(String::as_str).filter(|n| *n != self.current_node).collect();
        lines.push(format!("Other available agents: {}", roster.join(", ")));
        lines.push(
            "If you have nothing further to add, remain silent to end the swarm.".to_string(),
        );

        match original_task {
            Value::String(_) => Value::String(lines.join("\n\n")),
            other => {
                let mut parts = vec![Value::String(lines.join("\n\n"))];
                if let Value::Array(blocks) = other {
                    parts.extend(blocks.clone());
                }
                Value::Array(parts)
            }
        }
    }

    /// Drives the turn loop until the swarm completes, fails, or
    /// interrupts, streaming events onto `tx`.
    ///
    /// If the interrupt state is already activated on entry, `task` is
    /// treated as the resume payload for whichever node was interrupted
    /// rather than a fresh task.
    pub async fn stream(&mut self, task: Value, tx: mpsc::Sender<MultiAgentEvent>) -> Result<RunResult> {
        let start = Instant::now();
        let mut last_handoff_message: Option<String> = None;

        if self.interrupt_state.activated {
            self.interrupt_state.resume_payload = Some(task.clone());
        }

        loop {
            if self.status != RunStatus::Running {
                break;
            }
            if let Some(reason) = self.check_continuation_limits() {
                self.status = RunStatus::Failed;
                return Err(OrchestratorError::ContinuationLimitExceeded(reason));
            }

            let hook_outcome = self.hook.call(&self.current_node, &self.shared_context).await;
            match hook_outcome {
                BeforeNodeCallOutcome::Cancel { message } => {
                    let _ = tx
                        .send(MultiAgentEvent::NodeCancel { node_id: self.current_node.clone(), message })
                        .await;
                    self.status = RunStatus::Failed;
                    break;
                }
                BeforeNodeCallOutcome::Interrupt { interrupt_ids } => {
                    let node = self.nodes.get(&self.current_node).expect("current node must exist");
                    let snapshot = match &node.executor {
                        crate::node::Executor::Agent(agent) => agent.snapshot(),
                        crate::node::Executor::Nested(_) => Default::default(),
                    };
                    self.interrupt_state.activate(
                        &self.current_node,
                        interrupt_ids.clone(),
                        NodeInterruptContext::from_snapshot(snapshot),
                        InterruptOrigin::Hook,
                    );
                    let _ = tx
                        .send(MultiAgentEvent::NodeInterrupt {
                            node_id: self.current_node.clone(),
                            interrupts: interrupt_ids.into_iter().map(Value::String).collect(),
                        })
                        .await;
                    self.status = RunStatus::Interrupted;
                    break;
                }
                BeforeNodeCallOutcome::Proceed => {}
            }

            let input = if self.interrupt_state.is_node_activated(&self.current_node) {
                self.interrupt_state
                    .resume_responses(&self.current_node)
                    .unwrap_or(Value::Null)
            } else {
                self.build_turn_input(&task, last_handoff_message.as_deref())
            };

            let node = self.nodes.get_mut(&self.current_node).expect("current node must exist");
            let result = node.stream(input, tx.clone()).await;

            if result.status == NodeStatus::Interrupted {
                self.status = RunStatus::Interrupted;
                break;
            }

            self.usage.input_tokens += result.accumulated_usage.input_tokens;
            self.usage.output_tokens += result.accumulated_usage.output_tokens;
            self.usage.total_tokens += result.accumulated_usage.total_tokens;

            if result.status == NodeStatus::Failed {
                self.status = RunStatus::Failed;
                return Err(OrchestratorError::NodeExecution {
                    node: self.current_node.clone(),
                    source: result.error.unwrap_or_default(),
                });
            }

            if let Some(request) = extract_handoff_request(&result.content) {
                self.request_handoff(request)?;
            }

            self.node_history.push(self.current_node.clone());
            debug!(node = %self.current_node, "swarm turn completed");

            if self.interrupt_state.is_node_activated(&self.current_node) {
                self.interrupt_state.node_context.remove(&self.current_node);
                if self.interrupt_state.node_context.is_empty() {
                    self.interrupt_state.deactivate();
                }
            }

            match self.pending_handoff.take() {
                Some(request) => {
                    let from = self.current_node.clone();
                    let to = request.target_agent.clone();
                    last_handoff_message = request.message.clone();
                    let _ = tx
                        .send(MultiAgentEvent::Handoff {
                            from_node_ids: vec![from],
                            to_node_ids: vec![to.clone()],
                            message: request.message,
                        })
                        .await;
                    self.current_node = to;
                }
                None => {
                    self.status = RunStatus::Completed;
                    break;
                }
            }

            self.execution_time = start.elapsed();
        }

        self.execution_time = start.elapsed();
        if self.status != RunStatus::Completed {
            warn!(status = ?self.status, "swarm did not reach completed status");
        }

        Ok(RunResult {
            run_id: self.run_id,
            status: self.status,
            text: None,
            structured_output: None,
            usage: self.usage,
            execution_time_ms: self.execution_time.as_millis() as u64,
            node_history: self.node_history.clone(),
            execution_order: self.node_history.clone(),
            per_node: Default::default(),
            per_model_usage: Default::default(),
            model_id: None,
            estimated_cost_usd: 0.0,
        })
    }

    /// Snapshots current turn-loop state as a checkpoint. `current_task` is
    /// the task the run was driven with, recorded so a resume request can
    /// reconstruct the original turn-input text for nodes that aren't the
    /// one being resumed.
    pub fn to_checkpoint(&self, current_task: Value) -> OrchestratorCheckpoint {
        let interrupted = self.status == RunStatus::Interrupted;
        OrchestratorCheckpoint {
            kind: "swarm".to_string(),
            id: self.run_id.to_string(),
            status: self.status,
            completed_nodes: self.node_history.clone(),
            node_history: self.node_history.clone(),
            failed_nodes: Vec::new(),
            interrupted_nodes: if interrupted { vec![self.current_node.clone()] } else { Vec::new() },
            node_results: BTreeMap::new(),
            next_nodes_to_execute: Some(vec![self.current_node.clone()]),
            current_task,
            execution_order: self.node_history.clone(),
            internal_state: InternalState { interrupt_state: self.interrupt_state.clone() },
        }
    }

    /// Restores turn-loop state from a checkpoint built by [`Self::to_checkpoint`].
    /// The caller is expected to then call `stream` with the resume payload
    /// as `task`.
    pub fn restore_checkpoint(&mut self, checkpoint: &OrchestratorCheckpoint) {
        self.node_history = checkpoint.node_history.clone();
        self.status = checkpoint.status;
        if let Some(current) = checkpoint.next_nodes_to_execute.as_ref().and_then(|nodes| nodes.first()) {
            self.current_node = current.clone();
        }
        self.interrupt_state = checkpoint.internal_state.interrupt_state.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetitive_handoff_detection_respects_window_and_min_unique() {
        let history: Vec<String> =
            vec!["a", "b", "a", "b"].into_iter().map(String::from).collect();
        assert!(!is_repetitive(&history, 4, 2), "two distinct agents satisfies min_unique=2");
        assert!(is_repetitive(&history, 4, 3), "only two distinct agents is below min_unique=3");
        assert!(!is_repetitive(&history, 0, 2), "window=0 disables the check");
        assert!(!is_repetitive(&history, 5, 2), "history shorter than window never triggers");
    }

    #[test]
    fn disabled_repetitive_detection_defaults_to_zero() {
        let limits = SwarmLimits::default();
        assert_eq!(limits.repetitive_window, 0);
        assert_eq!(limits.min_unique_agents, 0);
    }
}
