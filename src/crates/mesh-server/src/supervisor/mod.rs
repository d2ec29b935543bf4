//! The run supervisor: budget accounting, tool-use policy enforcement, and
//! per-node stream-event persistence caps, driven one event at a time by
//! the SSE driver.

pub mod budget;
pub mod policy;

use std::collections::{BTreeMap, HashMap, HashSet};

use mesh_events::extract::{extract_tool_use_start, extract_token_usage_snapshot};
use mesh_events::{MultiAgentEvent, TokenAccumulator};
use serde_json::Value;

use crate::error::RunError;
use budget::RunBudget;
use policy::ToolPolicy;

/// Preset/schema deadline ceilings: the run's effective
/// wall-clock budget is the minimum of the global ceiling and whichever of
/// these apply.
pub const PRESET_CEILING_FACTORY_MS: u64 = 120_000;
pub const PRESET_CEILING_CONTRACT_MS: u64 = 180_000;
pub const PRESET_CEILING_AGENT_REVIEW_MS: u64 = 180_000;

pub fn effective_wall_clock_ms(global_ceiling_ms: u64, preset_key: Option<&str>, schema: Option<&str>) -> u64 {
    let mut ceiling = global_ceiling_ms;
    match preset_key {
        Some("orchestrator_factory") => ceiling = ceiling.min(PRESET_CEILING_FACTORY_MS),
        Some("orchestrator_contract") => ceiling = ceiling.min(PRESET_CEILING_CONTRACT_MS),
        Some("agent_review_judge") => ceiling = ceiling.min(PRESET_CEILING_AGENT_REVIEW_MS),
        _ => {}
    }
    if schema == Some("agent_review_verdict_v1") {
        ceiling = ceiling.min(PRESET_CEILING_AGENT_REVIEW_MS);
    }
    ceiling
}

/// Whether this run is subject to the agent-review contract: exactly two
/// coordination-tool invocations, at most 20 node-start events.
pub fn is_agent_review_run(preset_key: Option<&str>, schema: Option<&str>) -> bool {
    preset_key == Some("agent_review_judge") || schema == Some("agent_review_verdict_v1")
}

const AGENT_REVIEW_MAX_NODE_STARTS: u64 = 20;
const AGENT_REVIEW_REQUIRED_COORDINATION_USES: u64 = 2;

pub struct RunSupervisor {
    budget: RunBudget,
    policy: ToolPolicy,
    node_model: HashMap<String, String>,
    coordination_tool_name: String,
    agent_review: bool,

    max_persisted_stream_events_per_node: u64,
    persisted_stream_event_counts: HashMap<String, u64>,
    capped_nodes: HashSet<String>,
}

/// What the driver should do with an event after it passes through the
/// supervisor.
pub struct EventOutcome {
    /// Whether this event should be written to the `HistoryStore`. Always
    /// `true` for the consumer-facing SSE write — this only governs
    /// persistence.
    pub persist: bool,
    /// Set when the event pushed the run over a budget or policy limit;
    /// the driver terminates the run with this error after finishing the
    /// current write.
    pub terminate: Option<RunError>,
    /// A synthetic `multiAgentNodeStreamEventCapped` record to persist
    /// alongside (but never send to the consumer), emitted exactly once
    /// per node on the first suppression.
    pub synthetic_capped_record: Option<MultiAgentEvent>,
}

impl RunSupervisor {
    pub fn new(
        max_run_wall_clock_ms: u64,
        max_stream_idle_ms: u64,
        max_run_total_tokens: u64,
        policy: ToolPolicy,
        coordination_tool_name: impl Into<String>,
        agent_review: bool,
        max_persisted_stream_events_per_node: u64,
        node_model: HashMap<String, String>,
    ) -> Self {
        Self {
            budget: RunBudget::new(max_run_wall_clock_ms, max_stream_idle_ms, max_run_total_tokens),
            policy,
            node_model,
            coordination_tool_name: coordination_tool_name.into(),
            agent_review,
            max_persisted_stream_events_per_node,
            persisted_stream_event_counts: HashMap::new(),
            capped_nodes: HashSet::new(),
        }
    }

    pub fn budget(&self) -> &RunBudget {
        &self.budget
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    /// Called once per event pulled off the fan-in stream, before it is
    /// written to the consumer. Order matters: deadlines first (cheapest,
    /// applies regardless of payload), then tool-use extraction/policy,
    /// then usage extraction/budget, then the persistence cap — this must
    /// never suspend partway through.
    pub fn on_event(&mut self, event: &MultiAgentEvent) -> EventOutcome {
        if let Some(err) = self.budget.touch() {
            return EventOutcome { persist: true, terminate: Some(err), synthetic_capped_record: None };
        }

        if let MultiAgentEvent::NodeStart { .. } = event {
            self.budget.record_node_start();
            if self.agent_review && self.budget.node_start_count() > AGENT_REVIEW_MAX_NODE_STARTS {
                let err = RunError::agent_review_node_budget_exceeded(format!(
                    "{} node-start events exceeds agent-review cap of {}",
                    self.budget.node_start_count(),
                    AGENT_REVIEW_MAX_NODE_STARTS
                ));
                return EventOutcome { persist: true, terminate: Some(err), synthetic_capped_record: None };
            }
        }

        if let MultiAgentEvent::NodeStream { node_id, event: payload, .. } = event {
            if let Some(err) = self.account_nested_event(node_id, payload) {
                return EventOutcome { persist: true, terminate: Some(err), synthetic_capped_record: None };
            }

            if let Some(tool_use) = extract_tool_use_start(payload) {
                let fresh = self.budget.record_tool_use(&tool_use.tool_use_id, &tool_use.tool_name, &self.coordination_tool_name);
                if fresh {
                    if let Some(err) = self.policy.check(
                        &tool_use.tool_name,
                        self.budget.total_tool_uses(),
                        self.budget.per_tool_uses(&tool_use.tool_name),
                    ) {
                        return EventOutcome { persist: true, terminate: Some(err), synthetic_capped_record: None };
                    }
                }
            }

            if let Some(snapshot) = extract_token_usage_snapshot(payload) {
                let model_id = self.node_model.get(node_id).cloned().unwrap_or_default();
                let input = snapshot.input_tokens.unwrap_or(0);
                let output = snapshot.output_tokens.unwrap_or(0);
                if let Some(err) = self.budget.record_usage(node_id, &model_id, input, output) {
                    return EventOutcome { persist: true, terminate: Some(err), synthetic_capped_record: None };
                }
            }

            return self.apply_capture_cap(node_id);
        }

        if let MultiAgentEvent::Result { result } = event {
            if let Some(err) = self.budget.record_run_scoped_total(result.usage.total_tokens) {
                return EventOutcome { persist: true, terminate: Some(err), synthetic_capped_record: None };
            }
        }

        EventOutcome { persist: true, terminate: None, synthetic_capped_record: None }
    }

    /// Nested event flattening: a node's stream payload can itself be the
    /// wire form of a nested orchestrator's `multiAgentNodeStreamEvent` or
    /// `multiAgentResultEvent` — a sub-run forwarding its own events up as
    /// stream chunks of the node that hosts it. The inner event is
    /// budget-accounted as though it were top-level, without being
    /// persisted or forwarded to the consumer a second time.
    fn account_nested_event(&mut self, node_id: &str, payload: &Value) -> Option<RunError> {
        match payload.get("type").and_then(Value::as_str) {
            Some("multiAgentNodeStreamEvent") => {
                let inner = payload.get("event")?;
                if let Some(tool_use) = extract_tool_use_start(inner) {
                    let fresh = self.budget.record_tool_use(&tool_use.tool_use_id, &tool_use.tool_name, &self.coordination_tool_name);
                    if fresh {
                        if let Some(err) = self.policy.check(
                            &tool_use.tool_name,
                            self.budget.total_tool_uses(),
                            self.budget.per_tool_uses(&tool_use.tool_name),
                        ) {
                            return Some(err);
                        }
                    }
                }
                if let Some(snapshot) = extract_token_usage_snapshot(inner) {
                    let model_id = self.node_model.get(node_id).cloned().unwrap_or_default();
                    let input = snapshot.input_tokens.unwrap_or(0);
                    let output = snapshot.output_tokens.unwrap_or(0);
                    if let Some(err) = self.budget.record_usage(node_id, &model_id, input, output) {
                        return Some(err);
                    }
                }
                self.account_nested_event(node_id, inner)
            }
            Some("multiAgentResultEvent") => {
                let usage = payload.get("result")?.get("usage")?;
                let model_id = self.node_model.get(node_id).cloned().unwrap_or_default();
                let input = usage.get("inputTokens").and_then(Value::as_u64).unwrap_or(0);
                let output = usage.get("outputTokens").and_then(Value::as_u64).unwrap_or(0);
                self.budget.record_usage(node_id, &model_id, input, output)
            }
            _ => None,
        }
    }

    fn apply_capture_cap(&mut self, node_id: &str) -> EventOutcome {
        let count = self.persisted_stream_event_counts.entry(node_id.to_string()).or_insert(0);
        *count += 1;

        if *count <= self.max_persisted_stream_events_per_node {
            return EventOutcome { persist: true, terminate: None, synthetic_capped_record: None };
        }

        if self.capped_nodes.insert(node_id.to_string()) {
            let dropped_so_far = *count - self.max_persisted_stream_events_per_node;
            let synthetic = MultiAgentEvent::NodeStreamCapped { node_id: node_id.to_string(), dropped_so_far };
            EventOutcome { persist: false, terminate: None, synthetic_capped_record: Some(synthetic) }
        } else {
            EventOutcome { persist: false, terminate: None, synthetic_capped_record: None }
        }
    }

    /// Checked once at run end: the agent-review contract requires exactly
    /// two coordination-tool invocations over the whole run.
    pub fn check_agent_review_contract(&self) -> Option<RunError> {
        if !self.agent_review {
            return None;
        }
        if self.budget.coordination_tool_uses() != AGENT_REVIEW_REQUIRED_COORDINATION_USES {
            return Some(RunError::agent_review_contract_violation(format!(
                "expected exactly {} coordination-tool invocations, observed {}",
                AGENT_REVIEW_REQUIRED_COORDINATION_USES,
                self.budget.coordination_tool_uses()
            )));
        }
        None
    }

    pub fn per_model_usage(&self) -> BTreeMap<String, TokenAccumulator> {
        self.budget.per_model_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_events::event::NodeType;
    use policy::PolicyOverride;

    fn policy() -> ToolPolicy {
        ToolPolicy::resolve(&PolicyOverride::default(), mesh_events::RunMode::Swarm, None, None)
    }

    #[test]
    fn effective_deadline_applies_preset_ceiling() {
        assert_eq!(effective_wall_clock_ms(300_000, Some("orchestrator_factory"), None), 120_000);
        assert_eq!(effective_wall_clock_ms(60_000, Some("orchestrator_factory"), None), 60_000);
        assert_eq!(effective_wall_clock_ms(300_000, None, Some("agent_review_verdict_v1")), 180_000);
    }

    #[test]
    fn persistence_cap_emits_one_synthetic_record() {
        let mut sup = RunSupervisor::new(300_000, 60_000, 1_000_000, policy(), "swarm", false, 2, HashMap::new());

        let make = || MultiAgentEvent::NodeStream { node_id: "alpha".into(), event: serde_json::json!({"type": "text_delta"}) };

        let first = sup.on_event(&make());
        assert!(first.persist);
        let second = sup.on_event(&make());
        assert!(second.persist);
        let third = sup.on_event(&make());
        assert!(!third.persist);
        assert!(third.synthetic_capped_record.is_some());
        let fourth = sup.on_event(&make());
        assert!(!fourth.persist);
        assert!(fourth.synthetic_capped_record.is_none());
    }

    #[test]
    fn agent_review_contract_requires_exactly_two_coordination_uses() {
        let mut sup = RunSupervisor::new(300_000, 60_000, 1_000_000, policy(), "swarm", true, 120, HashMap::new());
        assert!(sup.check_agent_review_contract().is_some());

        sup.on_event(&MultiAgentEvent::NodeStream {
            node_id: "alpha".into(),
            event: serde_json::json!({"type": "tool_use_start", "toolUseId": "tu_1", "toolName": "swarm"}),
        });
        sup.on_event(&MultiAgentEvent::NodeStream {
            node_id: "alpha".into(),
            event: serde_json::json!({"type": "tool_use_start", "toolUseId": "tu_2", "toolName": "swarm"}),
        });
        assert!(sup.check_agent_review_contract().is_none());
    }

    #[test]
    fn agent_review_node_start_cap_terminates_run() {
        let mut sup = RunSupervisor::new(300_000, 60_000, 1_000_000, policy(), "swarm", true, 120, HashMap::new());
        for i in 0..20 {
            let outcome = sup.on_event(&MultiAgentEvent::NodeStart { node_id: format!("n{i}"), node_type: NodeType::Agent });
            assert!(outcome.terminate.is_none());
        }
        let outcome = sup.on_event(&MultiAgentEvent::NodeStart { node_id: "n20".into(), node_type: NodeType::Agent });
        assert!(outcome.terminate.is_some());
    }

    #[test]
    fn nested_node_stream_usage_is_accounted_without_a_second_persist() {
        let mut sup = RunSupervisor::new(300_000, 60_000, 100, policy(), "swarm", false, 120, HashMap::new());

        // A nested orchestrator forwards its own multiAgentNodeStreamEvent
        // up as the stream payload of the host node.
        let nested = MultiAgentEvent::NodeStream {
            node_id: "coordinator".into(),
            event: serde_json::json!({
                "type": "multiAgentNodeStreamEvent",
                "nodeId": "inner-agent",
                "event": {"type": "message_delta", "usage": {"input_tokens": 80, "output_tokens": 80}},
            }),
        };

        let outcome = sup.on_event(&nested);
        assert!(outcome.persist, "the outer event is still persisted once");
        assert!(outcome.terminate.is_some(), "the nested usage must blow the 100-token run budget");
    }

    #[test]
    fn nested_result_event_usage_is_folded_into_the_budget() {
        let mut sup = RunSupervisor::new(300_000, 60_000, 1_000_000, policy(), "swarm", false, 120, HashMap::new());

        let nested = MultiAgentEvent::NodeStream {
            node_id: "coordinator".into(),
            event: serde_json::json!({
                "type": "multiAgentResultEvent",
                "result": {"usage": {"inputTokens": 10, "outputTokens": 5}},
            }),
        };

        let outcome = sup.on_event(&nested);
        assert!(outcome.terminate.is_none());
        assert_eq!(sup.budget.per_node_usage("coordinator").total_tokens, 15);
    }
}
