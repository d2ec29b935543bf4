//! Top-level `Orchestrator` union over the three topologies, and the
//! glue that lets a graph/swarm act as a nested node executor.

use async_trait::async_trait;
use mesh_events::{MultiAgentEvent, RunResult};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;
use crate::graph::GraphOrchestrator;
use crate::interrupt::OrchestratorCheckpoint;
use crate::node::NestedOrchestrator;
use crate::swarm::SwarmOrchestrator;

/// A single-agent run is a swarm of one node with no handoff partners —
/// the single mode shares the swarm turn loop but never takes a handoff.
pub enum Orchestrator {
    Swarm(SwarmOrchestrator),
    Graph(GraphOrchestrator),
}

impl Orchestrator {
    pub async fn stream(&mut self, task: Value, tx: mpsc::Sender<MultiAgentEvent>) -> Result<RunResult> {
        match self {
            Orchestrator::Swarm(swarm) => swarm.stream(task, tx).await,
            Orchestrator::Graph(graph) => graph.stream(task, tx).await,
        }
    }

    /// Snapshots whichever topology this wraps as a resumable checkpoint.
    pub fn to_checkpoint(&self, current_task: Value) -> OrchestratorCheckpoint {
        match self {
            Orchestrator::Swarm(swarm) => swarm.to_checkpoint(current_task),
            Orchestrator::Graph(graph) => graph.to_checkpoint(current_task),
        }
    }

    /// Restores whichever topology this wraps from a checkpoint. The caller
    /// is expected to then call `stream` with the resume payload as `task`.
    pub fn restore_checkpoint(&mut self, checkpoint: &OrchestratorCheckpoint) {
        match self {
            Orchestrator::Swarm(swarm) => swarm.restore_checkpoint(checkpoint),
            Orchestrator::Graph(graph) => graph.restore_checkpoint(checkpoint),
        }
    }
}

/// Wraps an [`Orchestrator`] so it can be used as a [`NestedOrchestrator`]
/// node executor, i.e. a graph or swarm node whose body is itself another
/// orchestrator.
pub struct NestedOrchestratorHandle {
    inner: Mutex<Orchestrator>,
}

impl NestedOrchestratorHandle {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { inner: Mutex::new(orchestrator) }
    }
}

#[async_trait]
impl NestedOrchestrator for NestedOrchestratorHandle {
    async fn stream(&self, input: Value, tx: mpsc::Sender<MultiAgentEvent>) -> Result<MultiAgentEvent> {
        let mut orchestrator = self.inner.lock().await;
        let result = orchestrator.stream(input, tx).await?;
        Ok(MultiAgentEvent::Result { result })
    }
}
