//! Pause/resume protocol for human-in-the-loop interrupts.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentSnapshot;

/// Per-node context carried so an interrupted node can be restored and
/// re-entered on resume: its messages, scratch state, and any nested
/// interrupt state (for a node wrapping a nested orchestrator).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInterruptContext {
    #[serde(default)]
    pub messages: Vec<crate::messages::Message>,
    #[serde(default)]
    pub scratch_state: Value,
    #[serde(default)]
    pub nested: Option<Box<InterruptState>>,
}

impl NodeInterruptContext {
    pub fn from_snapshot(snapshot: AgentSnapshot) -> Self {
        Self { messages: snapshot.messages, scratch_state: snapshot.scratch_state, nested: None }
    }

    pub fn to_snapshot(&self) -> AgentSnapshot {
        AgentSnapshot { messages: self.messages.clone(), scratch_state: self.scratch_state.clone() }
    }
}

/// Whether a particular node's interrupt was raised by a `beforeNodeCall`
/// hook (re-execute from scratch) or by the executor itself (restore and
/// re-enter with the matching resume responses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptOrigin {
    Hook,
    Executor,
}

/// The serializable checkpoint that lets a paused orchestration resume.
///
/// Holds a set of currently-open interrupts keyed by id, a per-node context
/// map, an `activated` flag, and the latest resume payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptState {
    #[serde(default)]
    pub open_interrupt_ids: HashSet<String>,
    #[serde(default)]
    pub node_context: BTreeMap<String, NodeInterruptContext>,
    #[serde(default)]
    pub node_origin: BTreeMap<String, InterruptOrigin>,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub resume_payload: Option<Value>,
}

impl InterruptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `node_id` interrupted, keeping its restorable context
    /// and who raised it.
    pub fn activate(
        &mut self,
        node_id: &str,
        interrupt_ids: impl IntoIterator<Item = String>,
        context: NodeInterruptContext,
        origin: InterruptOrigin,
    ) {
        self.activated = true;
        self.open_interrupt_ids.extend(interrupt_ids);
        self.node_context.insert(node_id.to_string(), context);
        self.node_origin.insert(node_id.to_string(), origin);
    }

    /// Called once every previously-interrupted node completes without
    /// re-interrupting. Clears all interrupt bookkeeping.
    pub fn deactivate(&mut self) {
        self.activated = false;
        self.open_interrupt_ids.clear();
        self.node_context.clear();
        self.node_origin.clear();
        self.resume_payload = None;
    }

    pub fn is_node_activated(&self, node_id: &str) -> bool {
        self.activated && self.node_context.contains_key(node_id)
    }

    /// A resume turn's input: the `responses` array embedded in the latest
    /// resume payload, scoped to this node.
    pub fn resume_responses(&self, node_id: &str) -> Option<Value> {
        if !self.is_node_activated(node_id) {
            return None;
        }
        self.resume_payload
            .as_ref()
            .and_then(|payload| payload.get("responses"))
            .cloned()
    }
}

/// Serialization shape for session persistence:
/// `{type, id, status, completedNodes|nodeHistory, failedNodes,
/// interruptedNodes, nodeResults, nextNodesToExecute, currentTask,
/// executionOrder, _internalState: {interruptState}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorCheckpoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub status: mesh_events::RunStatus,
    #[serde(default)]
    pub completed_nodes: Vec<String>,
    #[serde(default)]
    pub node_history: Vec<String>,
    #[serde(default)]
    pub failed_nodes: Vec<String>,
    #[serde(default)]
    pub interrupted_nodes: Vec<String>,
    #[serde(default)]
    pub node_results: BTreeMap<String, mesh_events::NodeResult>,
    #[serde(default)]
    pub next_nodes_to_execute: Option<Vec<String>>,
    pub current_task: Value,
    #[serde(default)]
    pub execution_order: Vec<String>,
    #[serde(rename = "_internalState")]
    pub internal_state: InternalState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalState {
    pub interrupt_state: InterruptState,
}

impl OrchestratorCheckpoint {
    /// Deserializes a checkpoint, resetting to pending when
    /// `next_nodes_to_execute` is absent — the source's documented
    /// behavior for a checkpoint that never reached a ready set.
    pub fn is_resumable(&self) -> bool {
        self.next_nodes_to_execute.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_and_deactivation_round_trip() {
        let mut state = InterruptState::new();
        assert!(!state.activated);

        state.activate(
            "reviewer",
            vec!["int_1".to_string()],
            NodeInterruptContext::default(),
            InterruptOrigin::Hook,
        );
        assert!(state.is_node_activated("reviewer"));
        assert!(!state.is_node_activated("other"));

        state.deactivate();
        assert!(!state.activated);
        assert!(state.node_context.is_empty());
    }

    #[test]
    fn resume_responses_scoped_to_activated_node() {
        let mut state = InterruptState::new();
        state.activate(
            "reviewer",
            vec![],
            NodeInterruptContext::default(),
            InterruptOrigin::Executor,
        );
        state.resume_payload = Some(serde_json::json!({"responses": [{"approved": true}]}));

        assert!(state.resume_responses("reviewer").is_some());
        assert!(state.resume_responses("someone_else").is_none());
    }
}
