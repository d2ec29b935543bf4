//! The tagged event union streamed out of an orchestrator run.
//!
//! Uses the common `#[serde(tag = "type")]` convention for a websocket-style
//! event union, but each variant name is the literal `type` string the
//! consumer matches on (`multiAgentNodeStartEvent`, etc.) rather than a
//! Rust-cased variant, since these events cross the wire to non-Rust clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::NodeResult;

/// What kind of executor a node wraps — the tagged-union redesign of the
/// source's `instanceof`-based executor dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Agent,
    Nested,
}

/// Discriminated by a `type` tag; carries run/node/stream deltas, handoffs,
/// interrupts, and the terminal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MultiAgentEvent {
    #[serde(rename = "multiAgentNodeStartEvent")]
    NodeStart {
        #[serde(rename = "nodeId")]
        node_id: String,
        #[serde(rename = "nodeType")]
        node_type: NodeType,
    },

    #[serde(rename = "multiAgentNodeInputEvent")]
    NodeInput {
        #[serde(rename = "nodeId")]
        node_id: String,
        input: Value,
    },

    /// Carries a forwarded agent event or a nested orchestrator event as its
    /// `event` payload — opaque to this crate, probed by the extractors in
    /// `extract`.
    #[serde(rename = "multiAgentNodeStreamEvent")]
    NodeStream {
        #[serde(rename = "nodeId")]
        node_id: String,
        event: Value,
    },

    /// Synthetic record appended once a node's persisted stream events hit
    /// `MAX_PERSISTED_STREAM_EVENTS_PER_NODE`. Never sent to the consumer —
    /// history-persistence only.
    #[serde(rename = "multiAgentNodeStreamEventCapped")]
    NodeStreamCapped {
        #[serde(rename = "nodeId")]
        node_id: String,
        #[serde(rename = "droppedSoFar")]
        dropped_so_far: u64,
    },

    #[serde(rename = "multiAgentNodeStopEvent")]
    NodeStop {
        #[serde(rename = "nodeId")]
        node_id: String,
        #[serde(rename = "nodeResult")]
        node_result: NodeResult,
    },

    #[serde(rename = "multiAgentHandoffEvent")]
    Handoff {
        #[serde(rename = "fromNodeIds")]
        from_node_ids: Vec<String>,
        #[serde(rename = "toNodeIds")]
        to_node_ids: Vec<String>,
        #[serde(default)]
        message: Option<String>,
    },

    #[serde(rename = "multiAgentNodeCancelEvent")]
    NodeCancel {
        #[serde(rename = "nodeId")]
        node_id: String,
        message: String,
    },

    #[serde(rename = "multiAgentNodeInterruptEvent")]
    NodeInterrupt {
        #[serde(rename = "nodeId")]
        node_id: String,
        interrupts: Vec<Value>,
    },

    #[serde(rename = "multiAgentResultEvent")]
    Result { result: crate::model::RunResult },
}

impl MultiAgentEvent {
    /// The node id this event concerns, when it concerns exactly one node.
    /// `Handoff` and `Result` have no single owning node and return `None`.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            MultiAgentEvent::NodeStart { node_id, .. }
            | MultiAgentEvent::NodeInput { node_id, .. }
            | MultiAgentEvent::NodeStream { node_id, .. }
            | MultiAgentEvent::NodeStreamCapped { node_id, .. }
            | MultiAgentEvent::NodeStop { node_id, .. }
            | MultiAgentEvent::NodeCancel { node_id, .. }
            | MultiAgentEvent::NodeInterrupt { node_id, .. } => Some(node_id),
            MultiAgentEvent::Handoff { .. } | MultiAgentEvent::Result { .. } => None,
        }
    }

    /// The literal `type` tag, for the SSE `event: <type>` line. Kept in
    /// sync with the `#[serde(rename = ...)]` attributes above.
    pub fn type_tag(&self) -> &'static str {
        match self {
            MultiAgentEvent::NodeStart { .. } => "multiAgentNodeStartEvent",
            MultiAgentEvent::NodeInput { .. } => "multiAgentNodeInputEvent",
            MultiAgentEvent::NodeStream { .. } => "multiAgentNodeStreamEvent",
            MultiAgentEvent::NodeStreamCapped { .. } => "multiAgentNodeStreamEventCapped",
            MultiAgentEvent::NodeStop { .. } => "multiAgentNodeStopEvent",
            MultiAgentEvent::Handoff { .. } => "multiAgentHandoffEvent",
            MultiAgentEvent::NodeCancel { .. } => "multiAgentNodeCancelEvent",
            MultiAgentEvent::NodeInterrupt { .. } => "multiAgentNodeInterruptEvent",
            MultiAgentEvent::Result { .. } => "multiAgentResultEvent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeResult, NodeStatus};

    #[test]
    fn tag_round_trips_through_serde() {
        let event = MultiAgentEvent::NodeStart {
            node_id: "alpha".to_string(),
            node_type: NodeType::Agent,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "multiAgentNodeStartEvent");
        assert_eq!(json["nodeId"], "alpha");

        let back: MultiAgentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.node_id(), Some("alpha"));
    }

    #[test]
    fn handoff_and_result_have_no_owning_node() {
        let handoff = MultiAgentEvent::Handoff {
            from_node_ids: vec!["alpha".to_string()],
            to_node_ids: vec!["beta".to_string()],
            message: Some("over to you".to_string()),
        };
        assert_eq!(handoff.node_id(), None);
        assert_eq!(handoff.type_tag(), "multiAgentHandoffEvent");

        let stop = MultiAgentEvent::NodeStop {
            node_id: "alpha".to_string(),
            node_result: NodeResult {
                status: NodeStatus::Completed,
                duration_ms: 12,
                content: None,
                accumulated_usage: Default::default(),
                accumulated_metrics: Default::default(),
                execution_count: 1,
                interrupts: Vec::new(),
                error: None,
            },
        };
        assert_eq!(stop.node_id(), Some("alpha"));
    }
}
