//! Process-local [`HistoryStore`] for development and tests. Mirrors
//! `mesh_checkpoint::memory::InMemoryCheckpointer`'s `Arc<RwLock<HashMap>>`
//! shape.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mesh_events::{MultiAgentEvent, NodeResult, RunMetrics, RunMode, RunStatus, TokenAccumulator};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::history::{HistoryResult, HistoryStats, HistoryStore, RunEventRecord, RunNodeMetric, RunSummary};

#[derive(Default)]
struct Storage {
    summaries: HashMap<Uuid, RunSummary>,
    events: HashMap<Uuid, Vec<RunEventRecord>>,
    node_metrics: HashMap<Uuid, Vec<RunNodeMetric>>,
}

#[derive(Clone)]
pub struct InMemoryHistoryStore {
    storage: Arc<RwLock<Storage>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self { storage: Arc::new(RwLock::new(Storage::default())) }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn start_run(&self, run_id: Uuid, mode: RunMode, started_at: DateTime<Utc>) -> HistoryResult<()> {
        let summary = RunSummary {
            run_id,
            mode,
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            usage: TokenAccumulator::default(),
            metrics: RunMetrics::default(),
            estimated_cost_usd: 0.0,
            error_code: None,
            error_message: None,
            persistence_finalized: false,
        };
        self.storage.write().await.summaries.insert(run_id, summary);
        Ok(())
    }

    async fn append_event(&self, run_id: Uuid, sequence: u64, event: &MultiAgentEvent) -> HistoryResult<()> {
        self.storage
            .write()
            .await
            .events
            .entry(run_id)
            .or_default()
            .push(RunEventRecord { run_id, sequence, event: event.clone(), recorded_at: Utc::now() });
        Ok(())
    }

    async fn record_node_metric(&self, run_id: Uuid, node_id: &str, result: &NodeResult) -> HistoryResult<()> {
        self.storage
            .write()
            .await
            .node_metrics
            .entry(run_id)
            .or_default()
            .push(RunNodeMetric { run_id, node_id: node_id.to_string(), result: result.clone() });
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: Uuid,
        completed_at: DateTime<Utc>,
        usage: TokenAccumulator,
        metrics: RunMetrics,
        estimated_cost_usd: f64,
    ) -> HistoryResult<()> {
        let mut storage = self.storage.write().await;
        let Some(summary) = storage.summaries.get_mut(&run_id) else {
            return Err(DatabaseError::not_found(format!("run {run_id}")));
        };
        if summary.persistence_finalized {
            return Ok(());
        }
        summary.status = RunStatus::Completed;
        summary.completed_at = Some(completed_at);
        summary.usage = usage;
        summary.metrics = metrics;
        summary.estimated_cost_usd = estimated_cost_usd;
        summary.persistence_finalized = true;
        Ok(())
    }

    async fn fail_run(
        &self,
        run_id: Uuid,
        completed_at: DateTime<Utc>,
        status: RunStatus,
        error_code: Option<String>,
        error_message: Option<String>,
    ) -> HistoryResult<()> {
        let mut storage = self.storage.write().await;
        let Some(summary) = storage.summaries.get_mut(&run_id) else {
            return Err(DatabaseError::not_found(format!("run {run_id}")));
        };
        if summary.persistence_finalized {
            return Ok(());
        }
        summary.status = status;
        summary.completed_at = Some(completed_at);
        summary.error_code = error_code;
        summary.error_message = error_message;
        summary.persistence_finalized = true;
        Ok(())
    }

    async fn mark_run_completed_minimal(&self, run_id: Uuid, completed_at: DateTime<Utc>) -> HistoryResult<()> {
        let mut storage = self.storage.write().await;
        let Some(summary) = storage.summaries.get_mut(&run_id) else {
            return Err(DatabaseError::not_found(format!("run {run_id}")));
        };
        if summary.persistence_finalized {
            return Ok(());
        }
        summary.status = RunStatus::Completed;
        summary.completed_at = Some(completed_at);
        summary.persistence_finalized = true;
        Ok(())
    }

    async fn mark_run_failed_minimal(&self, run_id: Uuid, completed_at: DateTime<Utc>) -> HistoryResult<()> {
        let mut storage = self.storage.write().await;
        let Some(summary) = storage.summaries.get_mut(&run_id) else {
            return Err(DatabaseError::not_found(format!("run {run_id}")));
        };
        if summary.persistence_finalized {
            return Ok(());
        }
        summary.status = RunStatus::Failed;
        summary.completed_at = Some(completed_at);
        summary.persistence_finalized = true;
        Ok(())
    }

    async fn recover_running_runs(&self) -> HistoryResult<Vec<Uuid>> {
        let mut storage = self.storage.write().await;
        let mut recovered = Vec::new();
        for summary in storage.summaries.values_mut() {
            if summary.status == RunStatus::Running {
                summary.status = RunStatus::Interrupted;
                summary.persistence_finalized = true;
                recovered.push(summary.run_id);
            }
        }
        Ok(recovered)
    }

    async fn get_run(&self, run_id: Uuid) -> HistoryResult<Option<RunSummary>> {
        Ok(self.storage.read().await.summaries.get(&run_id).cloned())
    }

    async fn get_run_events(&self, run_id: Uuid) -> HistoryResult<Vec<RunEventRecord>> {
        Ok(self.storage.read().await.events.get(&run_id).cloned().unwrap_or_default())
    }

    async fn list_runs(&self, limit: u32, offset: u32, anomalies_only: bool, sort_by_risk: bool) -> HistoryResult<(Vec<RunSummary>, u32)> {
        let storage = self.storage.read().await;
        let mut runs: Vec<RunSummary> = storage.summaries.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        if anomalies_only {
            runs.retain(|r| r.status == RunStatus::Failed || r.status == RunStatus::Interrupted);
        }
        if sort_by_risk {
            runs.sort_by(|a, b| risk_score(b).partial_cmp(&risk_score(a)).unwrap_or(std::cmp::Ordering::Equal));
        }

        let total = runs.len() as u32;
        let page = runs.into_iter().skip(offset as usize).take(limit as usize).collect();
        Ok((page, total))
    }

    async fn stats(&self, since: DateTime<Utc>) -> HistoryResult<HistoryStats> {
        let storage = self.storage.read().await;
        let mut stats = HistoryStats::default();
        for summary in storage.summaries.values().filter(|r| r.started_at >= since) {
            stats.total_runs += 1;
            match summary.status {
                RunStatus::Completed => stats.completed_runs += 1,
                RunStatus::Failed => stats.failed_runs += 1,
                RunStatus::Interrupted => stats.interrupted_runs += 1,
                RunStatus::Running => {}
            }
            stats.total_tokens += summary.usage.total_tokens;
            stats.total_estimated_cost_usd += summary.estimated_cost_usd;
        }
        Ok(stats)
    }
}

fn risk_score(summary: &RunSummary) -> f64 {
    match summary.status {
        RunStatus::Failed => 2.0,
        RunStatus::Interrupted => 1.0,
        _ => 0.0,
    }
}
