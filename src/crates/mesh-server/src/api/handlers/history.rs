//! `GET /api/history*` — read access to persisted run summaries, events,
//! and aggregate stats.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::middleware::validation::validate_pagination;
use crate::api::models::ListRunsQuery;
use crate::api::response;
use crate::api::routes::AppState;
use crate::api::{ApiError, ApiResult};
use crate::history::{RunEventRecord, RunSummary};

const MAX_PAGE_SIZE: u32 = 200;

#[derive(Serialize)]
pub struct RunDetail {
    pub summary: RunSummary,
    pub events: Vec<RunEventRecord>,
}

pub async fn list_runs(State(app_state): State<AppState>, Query(query): Query<ListRunsQuery>) -> ApiResult<impl IntoResponse> {
    validate_pagination(query.offset, query.limit, MAX_PAGE_SIZE)?;
    let limit = query.limit;
    let (runs, total) = app_state
        .history
        .list_runs(limit, query.offset, query.anomalies_only, query.sort_by_risk)
        .await?;
    let page = query.offset / limit;
    Ok(response::paginated(runs, page, limit, total))
}

pub async fn get_run(State(app_state): State<AppState>, Path(run_id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    let summary = app_state
        .history
        .get_run(run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id}")))?;
    let events = app_state.history.get_run_events(run_id).await?;
    Ok(response::ok(RunDetail { summary, events }))
}

pub async fn run_stats(State(app_state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let since = Utc::now() - Duration::days(30);
    let stats = app_state.history.stats(since).await?;
    Ok(response::ok(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::history::memory::InMemoryHistoryStore;
    use crate::history::HistoryStore;
    use mesh_events::RunMode;
    use std::sync::Arc;

    #[tokio::test]
    async fn get_run_returns_not_found_for_an_unknown_id() {
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let state = AppState {
            history,
            config: Arc::new(ServerConfig::from_env()),
            checkpointer: Arc::new(mesh_checkpoint::InMemoryCheckpointer::new()),
        };
        let result = get_run(State(state), Path(Uuid::new_v4())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_runs_reports_a_started_run() {
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let run_id = Uuid::new_v4();
        history.start_run(run_id, RunMode::Single, Utc::now()).await.unwrap();
        let (runs, total) = history.list_runs(50, 0, false, false).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(runs[0].run_id, run_id);

        let state = AppState {
            history,
            config: Arc::new(ServerConfig::from_env()),
            checkpointer: Arc::new(mesh_checkpoint::InMemoryCheckpointer::new()),
        };
        let query = ListRunsQuery { limit: 50, offset: 0, anomalies_only: false, sort_by_risk: false };
        assert!(list_runs(State(state), Query(query)).await.is_ok());
    }
}
