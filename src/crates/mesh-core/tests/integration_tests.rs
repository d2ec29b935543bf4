//! End-to-end coverage of the swarm and graph run loops against a mock
//! agent, exercising handoff, parallel fan-out, and failure propagation
//! together rather than unit-by-unit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mesh_core::agent::{Agent, AgentResult, AgentSnapshot, StopReason};
use mesh_core::graph::{AlwaysTrue, GraphLimits, GraphOrchestrator};
use mesh_core::node::{Executor, NodeRuntime};
use mesh_core::orchestrator::Orchestrator;
use mesh_core::swarm::{NoopHook, SwarmLimits, SwarmOrchestrator};
use mesh_events::{GraphEdge, MultiAgentEvent, RunStatus};
use mesh_tools::{InMemoryToolRegistry, ToolRegistry};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// An agent whose reply is scripted per call: either plain text or a
/// `handoff_to_agent` content payload the swarm turn loop recognizes.
struct ScriptedAgent {
    name: String,
    replies: std::sync::Mutex<Vec<Value>>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    fn new(name: &str, replies: Vec<Value>) -> Self {
        Self { name: name.to_string(), replies: std::sync::Mutex::new(replies), calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Arc<dyn ToolRegistry> {
        Arc::new(InMemoryToolRegistry::new())
    }

    async fn stream(&self, _input: Value, _tx: mpsc::Sender<Value>) -> mesh_core::Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        let content = if replies.is_empty() { json!({"text": "done"}) } else { replies.remove(0) };
        Ok(AgentResult {
            stop_reason: StopReason::EndTurn,
            content: Some(content),
            accumulated_usage: Default::default(),
            interrupts: Vec::new(),
        })
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot::default()
    }

    async fn restore(&self, _snapshot: AgentSnapshot) {}
}

fn node_of(agent: Arc<ScriptedAgent>) -> NodeRuntime {
    let node_id = agent.name.clone();
    NodeRuntime::new(node_id, Executor::Agent(agent as Arc<dyn Agent>))
}

#[tokio::test]
async fn swarm_hands_off_once_then_completes() {
    let alpha = Arc::new(ScriptedAgent::new(
        "alpha",
        vec![json!({"handoff_to_agent": {"target_agent": "bravo", "message": "over to you"}})],
    ));
    let bravo = Arc::new(ScriptedAgent::new("bravo", vec![json!({"text": "all set"})]));

    let nodes = vec![node_of(alpha.clone()), node_of(bravo.clone())];
    let mut orchestrator = SwarmOrchestrator::new(
        uuid::Uuid::new_v4(),
        nodes,
        "alpha",
        SwarmLimits::default(),
        Arc::new(NoopHook),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::channel(64);
    let task = json!({"text": "start"});
    let handle = tokio::spawn(async move { orchestrator.stream(task, tx).await });

    let mut saw_handoff = false;
    while let Some(event) = rx.recv().await {
        if matches!(event, MultiAgentEvent::Handoff { .. }) {
            saw_handoff = true;
        }
    }
    let result = handle.await.unwrap().unwrap();

    assert!(saw_handoff);
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.node_history, vec!["alpha".to_string(), "bravo".to_string()]);
    assert_eq!(alpha.calls(), 1);
    assert_eq!(bravo.calls(), 1);
}

#[tokio::test]
async fn swarm_rejects_a_handoff_to_an_unknown_agent() {
    let alpha = Arc::new(ScriptedAgent::new(
        "alpha",
        vec![json!({"handoff_to_agent": {"target_agent": "ghost", "message": "nope"}})],
    ));
    let nodes = vec![node_of(alpha)];
    let mut orchestrator = SwarmOrchestrator::new(
        uuid::Uuid::new_v4(),
        nodes,
        "alpha",
        SwarmLimits::default(),
        Arc::new(NoopHook),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move { orchestrator.stream(json!({"text": "go"}), tx).await });
    while rx.recv().await.is_some() {}
    let result = handle.await.unwrap();

    assert!(result.is_err());
}

#[tokio::test]
async fn single_agent_run_completes_without_a_coordination_tool() {
    let solo = Arc::new(ScriptedAgent::new("solo", vec![json!({"text": "the answer"})]));
    let nodes = vec![node_of(solo.clone())];
    let mut orchestrator = SwarmOrchestrator::new(
        uuid::Uuid::new_v4(),
        nodes,
        "solo",
        SwarmLimits::default(),
        Arc::new(NoopHook),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move { orchestrator.stream(json!({"text": "hi"}), tx).await });
    while rx.recv().await.is_some() {}
    let result = handle.await.unwrap().unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.node_history, vec!["solo".to_string()]);
    assert_eq!(solo.calls(), 1);
}

#[tokio::test]
async fn graph_runs_independent_nodes_then_a_dependent_one() {
    let fetch = Arc::new(ScriptedAgent::new("fetch", vec![json!({"text": "fetched"})]));
    let analyze = Arc::new(ScriptedAgent::new("analyze", vec![json!({"text": "analyzed"})]));
    let report = Arc::new(ScriptedAgent::new("report", vec![json!({"text": "reported"})]));

    let nodes = vec![node_of(fetch.clone()), node_of(analyze.clone()), node_of(report.clone())];
    let edges = vec![
        GraphEdge { from: "fetch".to_string(), to: "report".to_string(), condition: None },
        GraphEdge { from: "analyze".to_string(), to: "report".to_string(), condition: None },
    ];

    let mut orchestrator = GraphOrchestrator::new(
        uuid::Uuid::new_v4(),
        nodes,
        edges,
        Vec::new(),
        Arc::new(AlwaysTrue),
        GraphLimits::default(),
    )
    .unwrap();

    let (tx, mut rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move { orchestrator.stream(json!({"text": "go"}), tx).await });
    while rx.recv().await.is_some() {}
    let result = handle.await.unwrap().unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(report.calls(), 1);
    // fetch/analyze are both entry points (no incoming edges) and must run
    // before report, which depends on both.
    let report_pos = result.execution_order.iter().position(|n| n == "report").unwrap();
    let fetch_pos = result.execution_order.iter().position(|n| n == "fetch").unwrap();
    let analyze_pos = result.execution_order.iter().position(|n| n == "analyze").unwrap();
    assert!(fetch_pos < report_pos);
    assert!(analyze_pos < report_pos);
}

#[tokio::test]
async fn orchestrator_enum_dispatches_to_the_wrapped_swarm() {
    let solo = Arc::new(ScriptedAgent::new("solo", vec![json!({"text": "ok"})]));
    let nodes = vec![node_of(solo)];
    let swarm = SwarmOrchestrator::new(uuid::Uuid::new_v4(), nodes, "solo", SwarmLimits::default(), Arc::new(NoopHook)).unwrap();
    let mut orchestrator = Orchestrator::Swarm(swarm);

    let (tx, mut rx) = mpsc::channel(64);
    let result = {
        let task = json!({"text": "hi"});
        let recv = tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        });
        let result = orchestrator.stream(task, tx).await.unwrap();
        let events = recv.await.unwrap();
        assert!(!events.is_empty());
        result
    };

    assert_eq!(result.status, RunStatus::Completed);
    let _: BTreeMap<String, _> = result.per_node;
}
