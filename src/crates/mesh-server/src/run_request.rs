//! Validates a `POST /api/run` body and wires it into an [`Orchestrator`],
//! the matching [`RunSupervisor`], and the initial task payload.
//!
//! This is the seam where a wire-level request turns into the opaque
//! `mesh-core` types: resolving each agent's model and tool list, injecting
//! the coordination tool for swarm runs, and picking the topology.

use std::collections::HashMap;
use std::sync::Arc;

use mesh_core::agent::Agent;
use mesh_core::graph::{AlwaysTrue, GraphLimits, GraphOrchestrator};
use mesh_core::node::{Executor, NodeRuntime};
use mesh_core::orchestrator::Orchestrator;
use mesh_core::swarm::{NoopHook, SwarmLimits, SwarmOrchestrator};
use mesh_events::{GraphEdge, RunMode};
use mesh_tools::HandoffTool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::LlmAgent;
use crate::api::middleware::validation::{validate_not_empty, validate_string_length};
use crate::config::ServerConfig;
use crate::model_resolution;
use crate::supervisor::policy::{PolicyOverride, ToolPolicy};
use crate::supervisor::{self, RunSupervisor};
use crate::tool_catalog;

const MAX_AGENTS: usize = 5;
const MAX_SYSTEM_PROMPT_CHARS: usize = 500;
const MAX_EDGES: usize = 10;
const MAX_HANDOFFS_CAP: u32 = 5;
const MAX_SESSION_ID_CHARS: usize = 128;
const VALID_SCHEMAS: [&str; 3] =
    ["article_summary_v1", "orchestration_decision_v1", "agent_review_verdict_v1"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpecBody {
    pub name: String,
    pub model_id: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdgeBody {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Option<String>,
}

/// The wire shape of a run request. Field names follow the camelCase
/// convention the consumer sees in every other record on this API.
///
/// Also the shape persisted alongside a checkpoint on interrupt, so a
/// resume request can rebuild the same orchestrator structurally before
/// restoring its dynamic state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequestBody {
    pub mode: String,
    pub prompt: String,
    #[serde(default)]
    pub agents: Vec<AgentSpecBody>,
    #[serde(default)]
    pub edges: Vec<GraphEdgeBody>,
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub max_handoffs: Option<u32>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub structured_output_schema: Option<String>,
    #[serde(default)]
    pub preset_key: Option<String>,
}

/// Everything the SSE driver needs to run a request to completion.
pub struct PreparedRun {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub orchestrator: Orchestrator,
    pub task: Value,
    pub supervisor: RunSupervisor,
    /// Kept so an interrupted run can be checkpointed alongside the body
    /// that built it, and a later resume request can rebuild the same
    /// orchestrator structurally before restoring its dynamic state.
    pub request_body: RunRequestBody,
}

/// Validates `body` and builds everything the driver needs. Returns a
/// human-readable message on the first validation failure — callers
/// surface it as a 422.
pub fn prepare_run(body: RunRequestBody, config: &ServerConfig) -> Result<PreparedRun, String> {
    prepare_run_with_id(body, config, Uuid::new_v4())
}

/// Same as [`prepare_run`] but pins the orchestrator's run id instead of
/// minting a fresh one — used by the resume path, where the rebuilt
/// orchestrator must carry the same id as the run it is resuming.
pub fn prepare_run_with_id(body: RunRequestBody, config: &ServerConfig, run_id: Uuid) -> Result<PreparedRun, String> {
    let mode = match body.mode.as_str() {
        "single" => RunMode::Single,
        "swarm" => RunMode::Swarm,
        "graph" => RunMode::Graph,
        other => return Err(format!("invalid mode '{other}', expected single, swarm, or graph")),
    };

    validate_not_empty(body.prompt.trim(), "prompt").map_err(|e| e.to_string())?;
    if body.agents.is_empty() || body.agents.len() > MAX_AGENTS {
        return Err(format!("agents must have between 1 and {MAX_AGENTS} entries"));
    }
    for agent in &body.agents {
        validate_string_length(&agent.system_prompt, &format!("agent '{}' systemPrompt", agent.name), 0, MAX_SYSTEM_PROMPT_CHARS)
            .map_err(|e| e.to_string())?;
    }
    if body.edges.len() > MAX_EDGES {
        return Err(format!("edges must have at most {MAX_EDGES} entries"));
    }
    if mode != RunMode::Graph && !body.edges.is_empty() {
        return Err("edges are only valid in graph mode".to_string());
    }
    if let Some(max_handoffs) = body.max_handoffs {
        if max_handoffs > MAX_HANDOFFS_CAP {
            return Err(format!("maxHandoffs must be at most {MAX_HANDOFFS_CAP}"));
        }
    }
    if let Some(session_id) = &body.session_id {
        validate_string_length(session_id, "sessionId", 0, MAX_SESSION_ID_CHARS).map_err(|e| e.to_string())?;
    }
    if let Some(schema) = &body.structured_output_schema {
        if !VALID_SCHEMAS.contains(&schema.as_str()) {
            return Err(format!("unknown structuredOutputSchema '{schema}'"));
        }
        if mode != RunMode::Single {
            return Err("structuredOutputSchema is only valid in single mode".to_string());
        }
    }
    if mode == RunMode::Single && body.agents.len() != 1 {
        return Err("single mode takes exactly one agent".to_string());
    }

    let mut node_model = HashMap::new();
    let mut nodes = Vec::new();
    for spec in &body.agents {
        node_model.insert(spec.name.clone(), spec.model_id.clone());
        let model = model_resolution::resolve_model(&spec.model_id).map_err(|e| e.to_string())?;
        let tools = tool_catalog::build_registry(&spec.tools);
        let mut agent = LlmAgent::new(&spec.name, model, tools, &spec.system_prompt);
        if mode == RunMode::Swarm {
            agent = agent.with_coordination_tool(Arc::new(HandoffTool));
        }
        let executor = Executor::Agent(Arc::new(agent) as Arc<dyn Agent>);
        nodes.push(NodeRuntime::new(spec.name.clone(), executor));
    }

    let entry_node = body.entry_point.clone().unwrap_or_else(|| body.agents[0].name.clone());

    let orchestrator = match mode {
        RunMode::Single | RunMode::Swarm => {
            let mut limits = SwarmLimits::default();
            if let Some(max_handoffs) = body.max_handoffs {
                limits.max_handoffs = max_handoffs;
            }
            // A single-agent run shares the swarm turn loop but has no
            // coordination tool to call, so it always completes after its
            // one turn regardless of the handoff ceiling.
            let swarm = SwarmOrchestrator::new(run_id, nodes, entry_node, limits, Arc::new(NoopHook))
                .map_err(|e| e.to_string())?;
            Orchestrator::Swarm(swarm)
        }
        RunMode::Graph => {
            let edges: Vec<GraphEdge> = body
                .edges
                .iter()
                .map(|e| GraphEdge { from: e.from.clone(), to: e.to.clone(), condition: e.condition.clone() })
                .collect();
            let graph = GraphOrchestrator::new(
                run_id,
                nodes,
                edges,
                body.entry_points.clone(),
                Arc::new(AlwaysTrue),
                GraphLimits::default(),
            )
            .map_err(|e| e.to_string())?;
            Orchestrator::Graph(graph)
        }
    };

    let preset_key = body.preset_key.as_deref();
    let schema = body.structured_output_schema.as_deref();
    let wall_clock_ms = supervisor::effective_wall_clock_ms(config.max_run_wall_clock_ms, preset_key, schema);
    let agent_review = supervisor::is_agent_review_run(preset_key, schema);

    let defaults = PolicyOverride {
        max_total_tool_uses: Some(config.max_tool_uses_per_run),
        default_per_tool_limit: Some(config.max_tool_uses_per_tool),
        ..Default::default()
    };
    let policy = ToolPolicy::resolve(&defaults, mode, None, None);

    let run_supervisor = RunSupervisor::new(
        wall_clock_ms,
        config.max_stream_idle_ms,
        config.max_run_total_tokens,
        policy,
        mesh_core::swarm::COORDINATION_TOOL_NAME,
        agent_review,
        config.max_persisted_stream_events_per_node,
        node_model,
    );

    let task = serde_json::json!({"text": body.prompt.clone()});

    Ok(PreparedRun { run_id, mode, orchestrator, task, supervisor: run_supervisor, request_body: body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_body() -> RunRequestBody {
        RunRequestBody {
            mode: "single".to_string(),
            prompt: "hello".to_string(),
            agents: vec![AgentSpecBody {
                name: "alpha".to_string(),
                model_id: "mock:reply".to_string(),
                system_prompt: "be helpful".to_string(),
                tools: Vec::new(),
                session_id: None,
            }],
            edges: Vec::new(),
            entry_point: None,
            entry_points: Vec::new(),
            max_handoffs: None,
            session_id: None,
            structured_output_schema: None,
            preset_key: None,
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        let mut body = base_body();
        body.mode = "parallel".to_string();
        let config = ServerConfig::from_env();
        assert!(prepare_run(body, &config).is_err());
    }

    #[test]
    fn rejects_empty_prompt() {
        let mut body = base_body();
        body.prompt = "   ".to_string();
        let config = ServerConfig::from_env();
        assert!(prepare_run(body, &config).is_err());
    }

    #[test]
    fn rejects_too_many_agents() {
        let mut body = base_body();
        body.mode = "swarm".to_string();
        for i in 0..6 {
            body.agents.push(AgentSpecBody {
                name: format!("agent-{i}"),
                model_id: "mock:reply".to_string(),
                system_prompt: String::new(),
                tools: Vec::new(),
                session_id: None,
            });
        }
        let config = ServerConfig::from_env();
        assert!(prepare_run(body, &config).is_err());
    }

    #[test]
    fn rejects_structured_output_schema_outside_single_mode() {
        let mut body = base_body();
        body.mode = "swarm".to_string();
        body.agents.push(AgentSpecBody {
            name: "beta".to_string(),
            model_id: "mock:reply".to_string(),
            system_prompt: String::new(),
            tools: Vec::new(),
            session_id: None,
        });
        body.structured_output_schema = Some("article_summary_v1".to_string());
        let config = ServerConfig::from_env();
        assert!(prepare_run(body, &config).is_err());
    }

    #[test]
    fn valid_single_request_builds_a_swarm_of_one() {
        let body = base_body();
        let config = ServerConfig::from_env();
        let prepared = prepare_run(body, &config).unwrap();
        assert_eq!(prepared.mode, RunMode::Single);
        assert!(matches!(prepared.orchestrator, Orchestrator::Swarm(_)));
    }

    #[test]
    fn preset_key_tightens_the_wall_clock_ceiling() {
        let mut body = base_body();
        body.preset_key = Some("orchestrator_factory".to_string());
        let config = ServerConfig::from_env();
        let prepared = prepare_run(body, &config).unwrap();
        assert!(prepared.supervisor.budget().remaining_wall_clock_budget_ms() <= 120_000);
    }
}
