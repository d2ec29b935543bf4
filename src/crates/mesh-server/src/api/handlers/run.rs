//! `POST /api/run` — validates the request, builds the orchestrator, and
//! streams the run as Server-Sent Events.
//!
//! `POST /api/run/:run_id/resume` — the same streaming contract, but
//! rebuilding the orchestrator from a checkpoint left by a prior interrupt
//! instead of a fresh request body.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use mesh_checkpoint::{CheckpointSerializer, JsonCheckpointSerializer};
use serde_json::Value;
use uuid::Uuid;

use crate::api::routes::AppState;
use crate::api::{ApiError, ApiResult};
use crate::driver::{self, ResumeCheckpoint};
use crate::run_request::{self, RunRequestBody};

pub async fn submit_run(
    State(app_state): State<AppState>,
    Json(body): Json<RunRequestBody>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let prepared = run_request::prepare_run(body, &app_state.config).map_err(ApiError::RunRequestRejected)?;
    let stream = driver::drive_run(prepared, app_state.history.clone(), app_state.checkpointer.clone());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Loads the checkpoint left by `run_id`'s last interrupt, rebuilds the
/// orchestrator it describes, restores its dynamic state, and drives it to
/// completion with `body` as the resume payload (the interrupted node's
/// `responses`, forwarded verbatim — see `InterruptState::resume_responses`).
pub async fn resume_run(
    State(app_state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let stored = app_state
        .checkpointer
        .load(&run_id.to_string())
        .await
        .map_err(|err| ApiError::InternalError(err.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("no resumable checkpoint for run {run_id}")))?;

    let resume: ResumeCheckpoint =
        JsonCheckpointSerializer.from_value(stored).map_err(|err| ApiError::InternalError(err.to_string()))?;

    if !resume.checkpoint.is_resumable() {
        return Err(ApiError::ValidationError(format!("run {run_id} has no resumable checkpoint")));
    }

    let mut prepared = run_request::prepare_run_with_id(resume.request_body, &app_state.config, run_id)
        .map_err(ApiError::RunRequestRejected)?;
    prepared.orchestrator.restore_checkpoint(&resume.checkpoint);
    prepared.task = body;

    // Only consumed once the rebuild above has actually succeeded: deleting
    // it earlier would strand an otherwise-valid checkpoint behind a
    // transient rebuild failure (e.g. a config change) with no way to retry.
    let _ = app_state.checkpointer.delete(&run_id.to_string()).await;

    let stream = driver::drive_run(prepared, app_state.history.clone(), app_state.checkpointer.clone());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::memory::InMemoryHistoryStore;
    use crate::history::HistoryStore;
    use crate::config::ServerConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn rejects_a_malformed_request_before_touching_the_store() {
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let state = AppState {
            history,
            config: Arc::new(ServerConfig::from_env()),
            checkpointer: Arc::new(mesh_checkpoint::InMemoryCheckpointer::new()),
        };
        let body = RunRequestBody {
            mode: "bogus".to_string(),
            prompt: "hi".to_string(),
            agents: Vec::new(),
            edges: Vec::new(),
            entry_point: None,
            entry_points: Vec::new(),
            max_handoffs: None,
            session_id: None,
            structured_output_schema: None,
            preset_key: None,
        };
        let result = submit_run(State(state), Json(body)).await;
        assert!(result.is_err());
    }
}
