//! Run/agent/node/edge data model shared by every orchestrator topology.
//!
//! Mirrors the shape of a graph-state-channel data model, generalized from
//! a single generic channel state to the three fixed topologies (single,
//! swarm, graph) this runtime supports.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The topology a run is executed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Single,
    Swarm,
    Graph,
}

/// Terminal or in-flight status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Execution status of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Interrupted,
}

/// A named agent binding: model, system prompt, and tool list.
///
/// The orchestrator core treats an agent as opaque beyond `model_id` and
/// `tools` — the actual `stream`/snapshot/restore contract lives on the
/// `mesh-core::agent::Agent` trait, not on this descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub model_id: String,
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `(from, to, optional condition)` — a graph orchestrator expects the
/// condition predicate to be supplied out of band (it is not serializable),
/// so this struct carries a condition *key* the graph looks up in a registry
/// of pure predicates over graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Option<String>,
}

/// Orchestrator-level wrapper over an executor (agent or nested orchestrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub result: Option<NodeResult>,
    #[serde(default)]
    pub execution_count: u32,
}

impl Node {
    pub fn pending(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Pending,
            result: None,
            execution_count: 0,
        }
    }
}

/// The per-node accumulated token usage. Updated by *counter-delta*
/// accumulation — see `usage::TokenAccumulator`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccumulator {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// The terminal outcome of a node invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub accumulated_usage: TokenAccumulator,
    #[serde(default)]
    pub accumulated_metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub execution_count: u32,
    #[serde(default)]
    pub interrupts: Vec<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Two-level mapping a swarm uses to propagate information between agents:
/// node id → (key → JSON value). Keys must be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedContext {
    #[serde(flatten)]
    by_node: BTreeMap<String, BTreeMap<String, Value>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `entries` into the bucket owned by `node_id`. Silently drops
    /// any entry whose key is empty — the caller is the coordination tool,
    /// which validates before calling, but this keeps the invariant even if
    /// a future caller forgets to.
    pub fn merge(&mut self, node_id: &str, entries: BTreeMap<String, Value>) {
        let bucket = self.by_node.entry(node_id.to_string()).or_default();
        for (k, v) in entries {
            if !k.is_empty() {
                bucket.insert(k, v);
            }
        }
    }

    pub fn get(&self, node_id: &str, key: &str) -> Option<&Value> {
        self.by_node.get(node_id)?.get(key)
    }

    /// Renders the full context as a single JSON object, for embedding in a
    /// swarm node's synthesized input block.
    pub fn dump(&self) -> Value {
        serde_json::to_value(&self.by_node).unwrap_or(Value::Null)
    }
}

/// `{totalToolUses, perToolUses: name→count, seenToolUseIds: set}`.
/// Deduplicated by tool-use id so retries of the same tool call are not
/// double-counted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolUseGuardState {
    pub total_tool_uses: u64,
    pub per_tool_uses: BTreeMap<String, u64>,
    #[serde(skip)]
    seen_tool_use_ids: HashSet<String>,
}

impl ToolUseGuardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a tool use if its id has not been seen before. Returns
    /// `false` when the id was already recorded (a retry), in which case no
    /// counter is touched.
    pub fn record(&mut self, tool_use_id: &str, tool_name: &str) -> bool {
        if !self.seen_tool_use_ids.insert(tool_use_id.to_string()) {
            return false;
        }
        self.total_tool_uses += 1;
        *self.per_tool_uses.entry(tool_name.to_string()).or_insert(0) += 1;
        true
    }
}

/// Additive reporting surface for `GET /api/history/stats`; not part of the
/// orchestration core's own invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub duration_ms: u64,
    pub node_count: u32,
    pub tool_use_count: u64,
}

/// A single invocation of the orchestration system from one `POST /api/run`
/// to its terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub prompt: Value,
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub structured_output_schema: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub usage: TokenAccumulator,
    #[serde(default)]
    pub metrics: RunMetrics,
    #[serde(default)]
    pub estimated_cost_usd: f64,
}

impl Run {
    /// `completed_at >= started_at` and exactly one terminal status — the
    /// invariant callers must uphold before persisting a terminal record.
    pub fn mark_terminal(&mut self, status: RunStatus, at: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        debug_assert!(at >= self.started_at);
        self.status = status;
        self.completed_at = Some(at);
    }
}

/// The `done` record's payload shape — the terminal success record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub structured_output: Option<Value>,
    pub usage: TokenAccumulator,
    pub execution_time_ms: u64,
    pub node_history: Vec<String>,
    pub execution_order: Vec<String>,
    pub per_node: BTreeMap<String, NodeResult>,
    pub per_model_usage: BTreeMap<String, TokenAccumulator>,
    #[serde(default)]
    pub model_id: Option<String>,
    pub estimated_cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_context_rejects_empty_keys() {
        let mut ctx = SharedContext::new();
        let mut entries = BTreeMap::new();
        entries.insert(String::new(), Value::Bool(true));
        entries.insert("region".to_string(), Value::String("eu".to_string()));
        ctx.merge("alpha", entries);

        assert!(ctx.get("alpha", "").is_none());
        assert_eq!(ctx.get("alpha", "region"), Some(&Value::String("eu".to_string())));
    }

    #[test]
    fn tool_use_guard_dedups_by_id() {
        let mut guard = ToolUseGuardState::new();
        assert!(guard.record("tu_1", "handoff_to_agent"));
        assert!(!guard.record("tu_1", "handoff_to_agent"));
        assert_eq!(guard.total_tool_uses, 1);
        assert_eq!(guard.per_tool_uses["handoff_to_agent"], 1);
    }
}
