//! `sqlx`-backed SQLite [`HistoryStore`], against the `run_summary` /
//! `run_event` / `run_node_metric` / `run_telemetry` schema in
//! `migrations/0001_init.sql`.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mesh_events::{MultiAgentEvent, NodeResult, RunMetrics, RunMode, RunStatus, TokenAccumulator};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::history::{HistoryResult, HistoryStats, HistoryStore, RunEventRecord, RunNodeMetric, RunSummary};

/// A `run_telemetry` span, recorded independent of the event log — the
/// abstract per-span tracing record.
#[derive(Debug, Clone)]
pub struct TelemetrySpan {
    pub span_id: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records a `run_telemetry` span. Not part of the `HistoryStore` trait
    /// (spans are additive and never gate run termination), but exposed for
    /// the driver to call alongside event persistence.
    pub async fn record_telemetry_span(&self, run_id: Uuid, span_id: &str, payload: &serde_json::Value) -> HistoryResult<()> {
        sqlx::query("INSERT OR REPLACE INTO run_telemetry (run_id, span_id, span_json, recorded_at) VALUES (?, ?, ?, ?)")
            .bind(run_id.to_string())
            .bind(span_id)
            .bind(serde_json::to_string(payload).map_err(|e| DatabaseError::type_error(e.to_string()))?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn mode_str(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Single => "single",
        RunMode::Swarm => "swarm",
        RunMode::Graph => "graph",
    }
}

fn parse_mode(s: &str) -> RunMode {
    match s {
        "swarm" => RunMode::Swarm,
        "graph" => RunMode::Graph,
        _ => RunMode::Single,
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Interrupted => "interrupted",
    }
}

fn parse_status(s: &str) -> RunStatus {
    match s {
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "interrupted" => RunStatus::Interrupted,
        _ => RunStatus::Running,
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<RunSummary, DatabaseError> {
    let run_id: String = row.try_get("run_id")?;
    let run_id = Uuid::from_str(&run_id).map_err(|e| DatabaseError::type_error(e.to_string()))?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(RunSummary {
        run_id,
        mode: parse_mode(row.try_get::<String, _>("mode")?.as_str()),
        status: parse_status(row.try_get::<String, _>("status")?.as_str()),
        started_at: parse_timestamp(&row.try_get::<String, _>("started_at")?),
        completed_at: completed_at.map(|s| parse_timestamp(&s)),
        usage: TokenAccumulator {
            input_tokens: row.try_get::<i64, _>("input_tokens")? as u64,
            output_tokens: row.try_get::<i64, _>("output_tokens")? as u64,
            total_tokens: row.try_get::<i64, _>("total_tokens")? as u64,
        },
        metrics: RunMetrics {
            duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
            node_count: row.try_get::<i64, _>("node_count")? as u32,
            tool_use_count: row.try_get::<i64, _>("tool_use_count")? as u64,
        },
        estimated_cost_usd: row.try_get("estimated_cost_usd")?,
        error_code: row.try_get("error_code")?,
        error_message: row.try_get("error_message")?,
        persistence_finalized: row.try_get::<i64, _>("persistence_finalized")? != 0,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn start_run(&self, run_id: Uuid, mode: RunMode, started_at: DateTime<Utc>) -> HistoryResult<()> {
        sqlx::query("INSERT INTO run_summary (run_id, mode, status, started_at) VALUES (?, ?, 'running', ?)")
            .bind(run_id.to_string())
            .bind(mode_str(mode))
            .bind(started_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_event(&self, run_id: Uuid, sequence: u64, event: &MultiAgentEvent) -> HistoryResult<()> {
        let event_json = serde_json::to_string(event).map_err(|e| DatabaseError::type_error(e.to_string()))?;
        sqlx::query("INSERT INTO run_event (run_id, sequence, event_type, event_json, recorded_at) VALUES (?, ?, ?, ?, ?)")
            .bind(run_id.to_string())
            .bind(sequence as i64)
            .bind(event.type_tag())
            .bind(event_json)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_node_metric(&self, run_id: Uuid, node_id: &str, result: &NodeResult) -> HistoryResult<()> {
        let result_json = serde_json::to_string(result).map_err(|e| DatabaseError::type_error(e.to_string()))?;
        sqlx::query("INSERT OR REPLACE INTO run_node_metric (run_id, node_id, result_json) VALUES (?, ?, ?)")
            .bind(run_id.to_string())
            .bind(node_id)
            .bind(result_json)
            .execute(&self.pool)
            .await?;
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
        let result = sqlx::query(
            "UPDATE run_summary SET status = 'completed', completed_at = ?, input_tokens = ?, output_tokens = ?, \
             total_tokens = ?, duration_ms = ?, node_count = ?, tool_use_count = ?, estimated_cost_usd = ?, \
             persistence_finalized = 1 WHERE run_id = ? AND persistence_finalized = 0",
        )
        .bind(completed_at.to_rfc3339())
        .bind(usage.input_tokens as i64)
        .bind(usage.output_tokens as i64)
        .bind(usage.total_tokens as i64)
        .bind(metrics.duration_ms as i64)
        .bind(metrics.node_count as i64)
        .bind(metrics.tool_use_count as i64)
        .bind(estimated_cost_usd)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            ensure_run_exists(&self.pool, run_id).await?;
        }
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
        let result = sqlx::query(
            "UPDATE run_summary SET status = ?, completed_at = ?, error_code = ?, error_message = ?, \
             persistence_finalized = 1 WHERE run_id = ? AND persistence_finalized = 0",
        )
        .bind(status_str(status))
        .bind(completed_at.to_rfc3339())
        .bind(error_code)
        .bind(error_message)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            ensure_run_exists(&self.pool, run_id).await?;
        }
        Ok(())
    }

    async fn mark_run_completed_minimal(&self, run_id: Uuid, completed_at: DateTime<Utc>) -> HistoryResult<()> {
        sqlx::query(
            "UPDATE run_summary SET status = 'completed', completed_at = ?, persistence_finalized = 1 \
             WHERE run_id = ? AND persistence_finalized = 0",
        )
        .bind(completed_at.to_rfc3339())
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_run_failed_minimal(&self, run_id: Uuid, completed_at: DateTime<Utc>) -> HistoryResult<()> {
        sqlx::query(
            "UPDATE run_summary SET status = 'failed', completed_at = ?, persistence_finalized = 1 \
             WHERE run_id = ? AND persistence_finalized = 0",
        )
        .bind(completed_at.to_rfc3339())
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recover_running_runs(&self) -> HistoryResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT run_id FROM run_summary WHERE status = 'running'").fetch_all(&self.pool).await?;
        let mut recovered = Vec::with_capacity(rows.len());
        for row in &rows {
            let run_id_str: String = row.try_get("run_id")?;
            let run_id = Uuid::from_str(&run_id_str).map_err(|e| DatabaseError::type_error(e.to_string()))?;
            recovered.push(run_id);
        }

        sqlx::query("UPDATE run_summary SET status = 'interrupted', persistence_finalized = 1 WHERE status = 'running'")
            .execute(&self.pool)
            .await?;

        Ok(recovered)
    }

    async fn get_run(&self, run_id: Uuid) -> HistoryResult<Option<RunSummary>> {
        let row = sqlx::query("SELECT * FROM run_summary WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_summary).transpose()
    }

    async fn get_run_events(&self, run_id: Uuid) -> HistoryResult<Vec<RunEventRecord>> {
        let rows = sqlx::query("SELECT sequence, event_json, recorded_at FROM run_event WHERE run_id = ? ORDER BY sequence ASC")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let sequence: i64 = row.try_get("sequence")?;
                let event_json: String = row.try_get("event_json")?;
                let recorded_at: String = row.try_get("recorded_at")?;
                let event: MultiAgentEvent = serde_json::from_str(&event_json).map_err(|e| DatabaseError::type_error(e.to_string()))?;
                Ok(RunEventRecord { run_id, sequence: sequence as u64, event, recorded_at: parse_timestamp(&recorded_at) })
            })
            .collect()
    }

    async fn list_runs(&self, limit: u32, offset: u32, anomalies_only: bool, sort_by_risk: bool) -> HistoryResult<(Vec<RunSummary>, u32)> {
        let where_clause = if anomalies_only { "WHERE status IN ('failed', 'interrupted')" } else { "" };
        let order_clause = if sort_by_risk {
            "ORDER BY CASE status WHEN 'failed' THEN 2 WHEN 'interrupted' THEN 1 ELSE 0 END DESC, started_at DESC"
        } else {
            "ORDER BY started_at DESC"
        };

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS n FROM run_summary {where_clause}"))
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        let rows = sqlx::query(&format!("SELECT * FROM run_summary {where_clause} {order_clause} LIMIT ? OFFSET ?"))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let runs = rows.iter().map(row_to_summary).collect::<Result<Vec<_>, _>>()?;
        Ok((runs, total as u32))
    }

    async fn stats(&self, since: DateTime<Utc>) -> HistoryResult<HistoryStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed, \
             SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed, \
             SUM(CASE WHEN status = 'interrupted' THEN 1 ELSE 0 END) AS interrupted, \
             COALESCE(SUM(total_tokens), 0) AS total_tokens, \
             COALESCE(SUM(estimated_cost_usd), 0) AS total_cost \
             FROM run_summary WHERE started_at >= ?",
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(HistoryStats {
            total_runs: row.try_get::<i64, _>("total")? as u64,
            completed_runs: row.try_get::<Option<i64>, _>("completed")?.unwrap_or(0) as u64,
            failed_runs: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0) as u64,
            interrupted_runs: row.try_get::<Option<i64>, _>("interrupted")?.unwrap_or(0) as u64,
            total_tokens: row.try_get::<i64, _>("total_tokens")? as u64,
            total_estimated_cost_usd: row.try_get("total_cost")?,
        })
    }
}

async fn ensure_run_exists(pool: &SqlitePool, run_id: Uuid) -> HistoryResult<()> {
    let exists: Option<i64> = sqlx::query("SELECT 1 AS x FROM run_summary WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?
        .map(|row| row.try_get::<i64, _>("x"))
        .transpose()?;
    if exists.is_none() {
        return Err(DatabaseError::not_found(format!("run {run_id}")));
    }
    Ok(())
}

/// Raw per-telemetry-span counts, for diagnostics. Not part of the core
/// `HistoryStats` surface.
#[allow(dead_code)]
async fn telemetry_span_counts(pool: &SqlitePool, run_id: Uuid) -> HistoryResult<BTreeMap<String, u64>> {
    let rows = sqlx::query("SELECT span_id FROM run_telemetry WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_all(pool)
        .await?;
    let mut counts = BTreeMap::new();
    for row in rows {
        let span_id: String = row.try_get("span_id")?;
        *counts.entry(span_id).or_insert(0u64) += 1;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn start_then_complete_round_trips() {
        let store = SqliteHistoryStore::new(test_pool().await);
        let run_id = Uuid::new_v4();
        store.start_run(run_id, RunMode::Graph, Utc::now()).await.unwrap();

        store
            .complete_run(
                run_id,
                Utc::now(),
                TokenAccumulator { input_tokens: 10, output_tokens: 5, total_tokens: 15 },
                RunMetrics { duration_ms: 100, node_count: 2, tool_use_count: 1 },
                0.002,
            )
            .await
            .unwrap();

        let summary = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.usage.total_tokens, 15);
        assert!(summary.persistence_finalized);
    }

    #[tokio::test]
    async fn terminal_write_after_finalization_is_a_no_op() {
        let store = SqliteHistoryStore::new(test_pool().await);
        let run_id = Uuid::new_v4();
        store.start_run(run_id, RunMode::Single, Utc::now()).await.unwrap();
        store
            .complete_run(run_id, Utc::now(), TokenAccumulator { total_tokens: 1, ..Default::default() }, RunMetrics::default(), 0.0)
            .await
            .unwrap();

        store.fail_run(run_id, Utc::now(), RunStatus::Failed, Some("X".into()), None).await.unwrap();

        let summary = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn recover_running_runs_marks_interrupted() {
        let store = SqliteHistoryStore::new(test_pool().await);
        let run_id = Uuid::new_v4();
        store.start_run(run_id, RunMode::Swarm, Utc::now()).await.unwrap();

        let recovered = store.recover_running_runs().await.unwrap();
        assert_eq!(recovered, vec![run_id]);
        assert_eq!(store.get_run(run_id).await.unwrap().unwrap().status, RunStatus::Interrupted);
    }

    #[tokio::test]
    async fn event_log_preserves_sequence_order() {
        let store = SqliteHistoryStore::new(test_pool().await);
        let run_id = Uuid::new_v4();
        store.start_run(run_id, RunMode::Single, Utc::now()).await.unwrap();

        store
            .append_event(run_id, 0, &MultiAgentEvent::NodeStart { node_id: "a".into(), node_type: mesh_events::event::NodeType::Agent })
            .await
            .unwrap();
        store
            .append_event(
                run_id,
                1,
                &MultiAgentEvent::NodeStream { node_id: "a".into(), event: serde_json::json!({"type": "delta"}) },
            )
            .await
            .unwrap();

        let events = store.get_run_events(run_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[1].sequence, 1);
    }
}
