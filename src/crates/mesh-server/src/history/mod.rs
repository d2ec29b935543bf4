//! Crash-safe run history: a `HistoryStore` capability
//! with idempotent terminal finalization and startup recovery of runs that
//! were `running` when the process last stopped.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mesh_events::{MultiAgentEvent, NodeResult, RunMetrics, RunMode, RunStatus, TokenAccumulator};
use serde::Serialize;
use uuid::Uuid;

use crate::db::DatabaseError;

pub type HistoryResult<T> = std::result::Result<T, DatabaseError>;

/// One `run_summary` row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub usage: TokenAccumulator,
    pub metrics: RunMetrics,
    pub estimated_cost_usd: f64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Set once a terminal status has been durably written, so a run's
    /// history record is finalized exactly once — a later call for the
    /// same run is a no-op.
    pub persistence_finalized: bool,
}

/// Append-log entry for a `run_event` row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEventRecord {
    pub run_id: Uuid,
    pub sequence: u64,
    pub event: MultiAgentEvent,
    pub recorded_at: DateTime<Utc>,
}

/// One `run_node_metric` row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunNodeMetric {
    pub run_id: Uuid,
    pub node_id: String,
    pub result: NodeResult,
}

/// Persistence for run summaries, the event log, per-node metrics, and
/// recovery of interrupted runs. Implementations must make `complete_run`/
/// `fail_run`/`mark_run_completed_minimal`/`mark_run_failed_minimal`
/// idempotent: once `persistence_finalized` is set for a run, later calls
/// are no-ops rather than errors.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn start_run(&self, run_id: Uuid, mode: RunMode, started_at: DateTime<Utc>) -> HistoryResult<()>;

    async fn append_event(&self, run_id: Uuid, sequence: u64, event: &MultiAgentEvent) -> HistoryResult<()>;

    async fn record_node_metric(&self, run_id: Uuid, node_id: &str, result: &NodeResult) -> HistoryResult<()>;

    /// Full terminal-success finalization: status, usage, metrics, cost.
    async fn complete_run(
        &self,
        run_id: Uuid,
        completed_at: DateTime<Utc>,
        usage: TokenAccumulator,
        metrics: RunMetrics,
        estimated_cost_usd: f64,
    ) -> HistoryResult<()>;

    /// Full terminal-failure finalization: status, error code/message.
    async fn fail_run(
        &self,
        run_id: Uuid,
        completed_at: DateTime<Utc>,
        status: RunStatus,
        error_code: Option<String>,
        error_message: Option<String>,
    ) -> HistoryResult<()>;

    /// Fallback used when the full `complete_run` write itself fails:
    /// writes just enough to mark the run terminal so it is not recovered
    /// as `running` on next startup.
    async fn mark_run_completed_minimal(&self, run_id: Uuid, completed_at: DateTime<Utc>) -> HistoryResult<()>;

    /// Fallback used when the full `fail_run` write itself fails.
    async fn mark_run_failed_minimal(&self, run_id: Uuid, completed_at: DateTime<Utc>) -> HistoryResult<()>;

    /// Startup recovery: every run left `running` (the process crashed or
    /// was killed mid-run) transitions to `interrupted`. Returns the ids
    /// recovered, for a log line.
    async fn recover_running_runs(&self) -> HistoryResult<Vec<Uuid>>;

    async fn get_run(&self, run_id: Uuid) -> HistoryResult<Option<RunSummary>>;

    async fn get_run_events(&self, run_id: Uuid) -> HistoryResult<Vec<RunEventRecord>>;

    async fn list_runs(&self, limit: u32, offset: u32, anomalies_only: bool, sort_by_risk: bool) -> HistoryResult<(Vec<RunSummary>, u32)>;

    async fn stats(&self, since: DateTime<Utc>) -> HistoryResult<HistoryStats>;
}

/// Aggregated response for `GET /api/history/stats`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_runs: u64,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub interrupted_runs: u64,
    pub total_tokens: u64,
    pub total_estimated_cost_usd: f64,
}

/// Finalizes a run's terminal status through the full writer, falling back
/// to the minimal writer if the full write fails, and logging if even that
/// fails (the run is then recovered as `interrupted` on next startup,
/// per `recover_running_runs`).
pub async fn finalize_success(
    store: &dyn HistoryStore,
    run_id: Uuid,
    completed_at: DateTime<Utc>,
    usage: TokenAccumulator,
    metrics: RunMetrics,
    estimated_cost_usd: f64,
) {
    if let Err(err) = store.complete_run(run_id, completed_at, usage, metrics, estimated_cost_usd).await {
        tracing::error!(%run_id, %err, "full success finalization failed, falling back to minimal");
        if let Err(err) = store.mark_run_completed_minimal(run_id, completed_at).await {
            tracing::error!(%run_id, %err, "minimal success finalization also failed; run left recoverable as running");
        }
    }
}

/// Same fallback chain as [`finalize_success`], for the failure path.
pub async fn finalize_failure(
    store: &dyn HistoryStore,
    run_id: Uuid,
    completed_at: DateTime<Utc>,
    status: RunStatus,
    error_code: Option<String>,
    error_message: Option<String>,
) {
    if let Err(err) = store.fail_run(run_id, completed_at, status, error_code.clone(), error_message.clone()).await {
        tracing::error!(%run_id, %err, "full failure finalization failed, falling back to minimal");
        if let Err(err) = store.mark_run_failed_minimal(run_id, completed_at).await {
            tracing::error!(%run_id, %err, "minimal failure finalization also failed; run left recoverable as running");
        }
    }
}
