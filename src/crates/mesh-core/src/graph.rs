//! Graph orchestrator: dependency-driven, parallel fan-out with
//! conditional edges.
//!
//! Built on a Pregel-style superstep loop (batches of concurrently ready
//! nodes, barrier between batches), generalized from channel-version
//! triggering to an explicit dependency-edge + condition-predicate
//! batch-triggered readiness rule.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mesh_events::{GraphEdge, MultiAgentEvent, NodeResult, NodeStatus, RunResult, RunStatus, TokenAccumulator};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout as tokio_timeout;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::interrupt::{InterruptOrigin, InterruptState, InternalState, NodeInterruptContext, OrchestratorCheckpoint};
use crate::merge::{FanInMerger, MergeItem, MergePoll};
use crate::node::NodeRuntime;

/// A pure predicate over graph state, looked up by the condition key
/// carried on [`GraphEdge`]. Registered out of band since predicates are
/// not serializable.
pub trait ConditionRegistry: Send + Sync {
    fn evaluate(&self, condition: &str, node_results: &BTreeMap<String, NodeResult>) -> bool;
}

/// A condition registry where every condition key evaluates to `true` —
/// the default for edges with no `condition` key configured.
pub struct AlwaysTrue;

impl ConditionRegistry for AlwaysTrue {
    fn evaluate(&self, _condition: &str, _node_results: &BTreeMap<String, NodeResult>) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct GraphLimits {
    pub max_node_executions: u32,
    pub execution_timeout: Duration,
    pub node_timeout: Option<Duration>,
    pub reset_on_revisit: bool,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_node_executions: 1000,
            execution_timeout: Duration::from_secs(900),
            node_timeout: None,
            reset_on_revisit: false,
        }
    }
}

/// Dependency-driven, parallel graph orchestrator supporting cycles
/// bounded by configuration.
pub struct GraphOrchestrator {
    run_id: Uuid,
    nodes: BTreeMap<String, NodeRuntime>,
    edges: Vec<GraphEdge>,
    entry_points: Vec<String>,
    conditions: Arc<dyn ConditionRegistry>,
    limits: GraphLimits,
    completed_nodes: BTreeSet<String>,
    failed_nodes: BTreeSet<String>,
    interrupted_nodes: BTreeSet<String>,
    node_results: BTreeMap<String, NodeResult>,
    execution_order: Vec<String>,
    total_executions: u32,
    usage: TokenAccumulator,
    status: RunStatus,
    interrupt_state: InterruptState,
}

impl GraphOrchestrator {
    /// Builds a graph over `nodes` and `edges`. Entry points default to
    /// every node with zero incoming edges when `entry_points` is empty;
    /// construction fails if that resolved set is empty.
    pub fn new(
        run_id: Uuid,
        nodes: Vec<NodeRuntime>,
        edges: Vec<GraphEdge>,
        entry_points: Vec<String>,
        conditions: Arc<dyn ConditionRegistry>,
        limits: GraphLimits,
    ) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for node in nodes {
            by_id.insert(node.node_id.clone(), node);
        }

        let entry_points = if entry_points.is_empty() {
            let has_incoming: BTreeSet<&str> = edges.iter().map(|e| e.to.as_str()).collect();
            by_id
                .keys()
                .filter(|id| !has_incoming.contains(id.as_str()))
                .cloned()
                .collect::<Vec<_>>()
        } else {
            entry_points
        };

        if entry_points.is_empty() {
            return Err(OrchestratorError::Validation(
                "graph has no entry points and no zero-dependency nodes".to_string(),
            ));
        }

        Ok(Self {
            run_id,
            nodes: by_id,
            edges,
            entry_points,
            conditions,
            limits,
            completed_nodes: BTreeSet::new(),
            failed_nodes: BTreeSet::new(),
            interrupted_nodes: BTreeSet::new(),
            node_results: BTreeMap::new(),
            execution_order: Vec::new(),
            total_executions: 0,
            usage: TokenAccumulator::default(),
            status: RunStatus::Running,
            interrupt_state: InterruptState::new(),
        })
    }

    fn incoming_edges<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a GraphEdge> {
        self.edges.iter().filter(move |e| e.to == node_id)
    }

    /// After batch `batch` completes, a node is newly ready iff it has at
    /// least one incoming edge, is not already completed (unless
    /// `resetOnRevisit`), every condition-satisfying incoming edge's source
    /// is completed, and at least one such edge's source is in `batch`
    /// (batch-triggered readiness).
    fn newly_ready(&self, batch: &BTreeSet<String>) -> Vec<String> {
        let mut ready = Vec::new();
        for (node_id, _) in &self.nodes {
            let mut incoming = self.incoming_edges(node_id).peekable();
            if incoming.peek().is_none() {
                continue;
            }
            if self.completed_nodes.contains(node_id) && !self.limits.reset_on_revisit {
                continue;
            }

            let mut all_satisfied_sources_completed = true;
            let mut any_source_in_batch = false;
            let mut has_satisfied_edge = false;
            for edge in self.incoming_edges(node_id) {
                let holds = match &edge.condition {
                    Some(cond) => self.conditions.evaluate(cond, &self.node_results),
                    None => true,
                };
                if !holds {
                    continue;
                }
                has_satisfied_edge = true;
                if !self.completed_nodes.contains(&edge.from) {
                    all_satisfied_sources_completed = false;
                }
                if batch.contains(&edge.from) {
                    any_source_in_batch = true;
                }
            }

            if has_satisfied_edge && all_satisfied_sources_completed && any_source_in_batch {
                ready.push(node_id.clone());
            }
        }
        ready
    }

    /// Synthesizes a node's input. A node being resumed after an interrupt
    /// gets the resume payload verbatim; otherwise it's the original task
    /// verbatim if it has no completed dependency results, or
    /// `Original Task: ...` followed by prior results labelled by node id.
    fn build_node_input(&self, node_id: &str, original_task: &Value, resume_input: Option<&Value>) -> Value {
        if let Some(payload) = resume_input {
            return payload.clone();
        }

        let deps: Vec<&str> = self
            .incoming_edges(node_id)
            .map(|e| e.from.as_str())
            .filter(|from| self.node_results.contains_key(*from))
            .collect();

        if deps.is_empty() {
            return original_task.clone();
        }

        let mut lines = vec![format!("Original Task: {}", original_task)];
        for dep in deps {
            if let Some(result) = self.node_results.get(dep) {
                lines.push(format!(
                    "Result from '{dep}': {}",
                    result.content.clone().unwrap_or(Value::Null)
                ));
            }
        }
        Value::String(lines.join("\n\n"))
    }

    /// Executes one batch of nodes concurrently, merging their events
    /// through a bounded fan-in queue. Returns the set of node ids that
    /// completed in this batch (for computing the next batch's readiness).
    async fn execute_batch(
        &mut self,
        batch: Vec<String>,
        original_task: &Value,
        tx: &mpsc::Sender<MultiAgentEvent>,
        resuming_nodes: &BTreeSet<String>,
        resume_payload: Option<&Value>,
    ) -> Result<BTreeSet<String>> {
        if self.limits.reset_on_revisit {
            for node_id in &batch {
                if self.completed_nodes.remove(node_id) {
                    if let Some(node) = self.nodes.get_mut(node_id) {
                        node.reset_to_initial_snapshot().await;
                    }
                }
            }
        }

        let (mut merger, merge_tx) = FanInMerger::new(batch.len(), batch.len() * 8 + 8);
        let node_timeout = self.limits.node_timeout;
        let mut handles = Vec::with_capacity(batch.len());

        for node_id in &batch {
            if self.total_executions >= self.limits.max_node_executions {
                return Err(OrchestratorError::ContinuationLimitExceeded(format!(
                    "maxNodeExecutions ({}) exceeded",
                    self.limits.max_node_executions
                )));
            }
            self.total_executions += 1;

            let node_resume_input = if resuming_nodes.contains(node_id) { resume_payload } else { None };
            let input = self.build_node_input(node_id, original_task, node_resume_input);
            let mut node = self.nodes.remove(node_id).expect("batch member must exist");
            let out_tx = tx.clone();
            let merge_tx = merge_tx.clone();
            let node_id_owned = node_id.clone();

            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let run = node.stream(input, out_tx.clone());
                let result = match node_timeout {
                    Some(limit) => match tokio_timeout(limit, run).await {
                        Ok(result) => result,
                        Err(_) => {
                            let elapsed = started.elapsed().as_millis() as u64;
                            let timeout_result = NodeResult {
                                status: NodeStatus::Failed,
                                duration_ms: elapsed,
                                content: None,
                                accumulated_usage: TokenAccumulator::default(),
                                accumulated_metrics: Default::default(),
                                execution_count: node.execution_count,
                                interrupts: Vec::new(),
                                error: Some("node timed out".to_string()),
                            };
                            let _ = out_tx
                                .send(MultiAgentEvent::NodeStop {
                                    node_id: node_id_owned.clone(),
                                    node_result: timeout_result.clone(),
                                })
                                .await;
                            let _ = merge_tx
                                .send(MergeItem::Error(OrchestratorError::NodeTimeout {
                                    node: node_id_owned.clone(),
                                    elapsed_ms: elapsed,
                                }))
                                .await;
                            let _ = merge_tx
                                .send(MergeItem::TaskDone { node_id: node_id_owned.clone() })
                                .await;
                            return (node_id_owned, node, timeout_result);
                        }
                    },
                    None => run.await,
                };

                if result.status == NodeStatus::Failed {
                    let _ = merge_tx
                        .send(MergeItem::Error(OrchestratorError::NodeExecution {
                            node: node_id_owned.clone(),
                            source: result.error.clone().unwrap_or_default(),
                        }))
                        .await;
                }
                let _ = merge_tx.send(MergeItem::TaskDone { node_id: node_id_owned.clone() }).await;
                (node_id_owned, node, result)
            });
            handles.push(handle);
        }
        drop(merge_tx);

        let mut first_error: Option<OrchestratorError> = None;
        let mut done_count = 0;
        while done_count < batch.len() {
            match merger.poll().await {
                MergePoll::Item(MergeItem::TaskDone { .. }) => done_count += 1,
                MergePoll::Item(MergeItem::Error(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                MergePoll::Item(MergeItem::Event(_)) => {}
                MergePoll::Idle => continue,
                MergePoll::Drained => break,
            }
        }

        let mut completed_this_batch = BTreeSet::new();
        for handle in handles {
            let (node_id, node, result) = handle.await.map_err(|e| {
                OrchestratorError::BatchExecution(format!("node task panicked: {e}"))
            })?;
            self.nodes.insert(node_id.clone(), node);
            match result.status {
                NodeStatus::Failed => {
                    self.failed_nodes.insert(node_id.clone());
                }
                NodeStatus::Interrupted => {
                    self.interrupted_nodes.insert(node_id.clone());
                }
                _ => {
                    self.completed_nodes.insert(node_id.clone());
                    completed_this_batch.insert(node_id.clone());
                }
            }
            self.usage.input_tokens += result.accumulated_usage.input_tokens;
            self.usage.output_tokens += result.accumulated_usage.output_tokens;
            self.usage.total_tokens += result.accumulated_usage.total_tokens;
            self.node_results.insert(node_id, result);
        }
        self.execution_order.extend(completed_this_batch.iter().cloned());

        if let Some(err) = first_error {
            return Err(err);
        }

        Ok(completed_this_batch)
    }

    /// Drives the graph to completion: entry batch, then repeatedly
    /// computes and executes newly-ready batches until none remain.
    ///
    /// If the orchestrator's interrupt state is activated on entry, `task`
    /// is treated as the resume payload rather than a fresh task: the first
    /// batch is the union of the nodes that were interrupted and the nodes
    /// that completed in that same batch, and the previously-interrupted
    /// nodes receive the resume payload verbatim as their input instead of
    /// the usual dependency-built one.
    pub async fn stream(&mut self, task: Value, tx: mpsc::Sender<MultiAgentEvent>) -> Result<RunResult> {
        let start = Instant::now();

        let (mut resuming_nodes, mut resume_payload, mut batch) = if self.interrupt_state.activated {
            let resuming_nodes = std::mem::take(&mut self.interrupted_nodes);
            let mut batch = resuming_nodes.clone();
            if let Some(ctx) = self.interrupt_state.node_context.get("__graph__") {
                if let Some(completed_this_batch) =
                    ctx.scratch_state.get("completedThisBatch").and_then(Value::as_array)
                {
                    batch.extend(completed_this_batch.iter().filter_map(Value::as_str).map(String::from));
                }
            }
            self.interrupt_state.deactivate();
            (resuming_nodes, Some(task.clone()), batch)
        } else {
            (BTreeSet::new(), None, self.entry_points.iter().cloned().collect())
        };

        while !batch.is_empty() {
            if start.elapsed() >= self.limits.execution_timeout {
                self.status = RunStatus::Failed;
                return Err(OrchestratorError::ContinuationLimitExceeded(format!(
                    "executionTimeout ({:?}) exceeded",
                    self.limits.execution_timeout
                )));
            }

            let ordered: Vec<String> = batch.iter().cloned().collect();
            let this_round_resuming = std::mem::take(&mut resuming_nodes);
            let this_round_resume_payload = resume_payload.take();
            let completed = match self
                .execute_batch(ordered, &task, &tx, &this_round_resuming, this_round_resume_payload.as_ref())
                .await
            {
                Ok(completed) => completed,
                Err(err) => {
                    self.status = RunStatus::Failed;
                    return Err(err);
                }
            };

            if !self.interrupted_nodes.is_empty() {
                // Record the completed-nodes snapshot into interrupt context
                // and exit without failing the run. Re-entry resumes by
                // re-executing the interrupted nodes plus any nodes
                // completed in the same batch.
                self.interrupt_state.activate(
                    "__graph__",
                    Vec::<String>::new(),
                    NodeInterruptContext {
                        messages: Vec::new(),
                        scratch_state: serde_json::json!({
                            "completedNodes": self.completed_nodes.iter().cloned().collect::<Vec<_>>(),
                            "interruptedNodes": self.interrupted_nodes.iter().cloned().collect::<Vec<_>>(),
                            "completedThisBatch": completed.iter().cloned().collect::<Vec<_>>(),
                        }),
                        nested: None,
                    },
                    InterruptOrigin::Executor,
                );
                self.status = RunStatus::Interrupted;
                return Ok(RunResult {
                    run_id: self.run_id,
                    status: self.status,
                    text: None,
                    structured_output: None,
                    usage: self.usage,
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    node_history: self.execution_order.clone(),
                    execution_order: self.execution_order.clone(),
                    per_node: self.node_results.clone(),
                    per_model_usage: Default::default(),
                    model_id: None,
                    estimated_cost_usd: 0.0,
                });
            }

            let ready = self.newly_ready(&completed);
            if !completed.is_empty() && !ready.is_empty() {
                let _ = tx
                    .send(MultiAgentEvent::Handoff {
                        from_node_ids: completed.iter().cloned().collect(),
                        to_node_ids: ready.clone(),
                        message: None,
                    })
                    .await;
            }
            batch = ready.into_iter().collect();
        }

        self.status = RunStatus::Completed;
        Ok(RunResult {
            run_id: self.run_id,
            status: self.status,
            text: None,
            structured_output: None,
            usage: self.usage,
            execution_time_ms: start.elapsed().as_millis() as u64,
            node_history: self.execution_order.clone(),
            execution_order: self.execution_order.clone(),
            per_node: self.node_results.clone(),
            per_model_usage: Default::default(),
            model_id: None,
            estimated_cost_usd: 0.0,
        })
    }

    /// Snapshots current batch-loop state as a checkpoint. `current_task` is
    /// the task the run was driven with, recorded so a resume request can
    /// reconstruct dependency-built input for nodes that aren't being resumed.
    pub fn to_checkpoint(&self, current_task: Value) -> OrchestratorCheckpoint {
        OrchestratorCheckpoint {
            kind: "graph".to_string(),
            id: self.run_id.to_string(),
            status: self.status,
            completed_nodes: self.completed_nodes.iter().cloned().collect(),
            node_history: self.execution_order.clone(),
            failed_nodes: self.failed_nodes.iter().cloned().collect(),
            interrupted_nodes: self.interrupted_nodes.iter().cloned().collect(),
            node_results: self.node_results.clone(),
            next_nodes_to_execute: Some(self.interrupted_nodes.iter().cloned().collect()),
            current_task,
            execution_order: self.execution_order.clone(),
            internal_state: InternalState { interrupt_state: self.interrupt_state.clone() },
        }
    }

    /// Restores batch-loop state from a checkpoint built by [`Self::to_checkpoint`].
    /// The caller is expected to then call `stream` with the resume payload
    /// as `task`.
    pub fn restore_checkpoint(&mut self, checkpoint: &OrchestratorCheckpoint) {
        self.completed_nodes = checkpoint.completed_nodes.iter().cloned().collect();
        self.failed_nodes = checkpoint.failed_nodes.iter().cloned().collect();
        self.interrupted_nodes = checkpoint.interrupted_nodes.iter().cloned().collect();
        self.node_results = checkpoint.node_results.clone();
        self.execution_order = checkpoint.execution_order.clone();
        self.status = checkpoint.status;
        self.interrupt_state = checkpoint.internal_state.interrupt_state.clone();
    }
}
