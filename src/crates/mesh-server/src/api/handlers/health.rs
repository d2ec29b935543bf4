//! Health check endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};

use crate::api::models::HealthResponse;
use crate::api::routes::AppState;
use crate::api::{response, ApiResult};

/// `GET /health` — liveness only, no store access.
pub async fn health() -> impl axum::response::IntoResponse {
    response::ok(HealthResponse::new("ok", "unknown"))
}

/// `GET /api/v1/system/health` — also probes the history store.
pub async fn health_detailed(State(app_state): State<AppState>) -> ApiResult<(StatusCode, Json<HealthResponse>)> {
    match app_state.history.stats(Utc::now() - Duration::seconds(1)).await {
        Ok(_) => Ok((StatusCode::OK, Json(HealthResponse::new("ok", "reachable")))),
        Err(_) => Ok((StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::new("error", "unreachable")))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::memory::InMemoryHistoryStore;
    use crate::history::HistoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn detailed_health_reports_ok_against_a_live_store() {
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let state = AppState {
            history,
            config: Arc::new(crate::config::ServerConfig::from_env()),
            checkpointer: Arc::new(mesh_checkpoint::InMemoryCheckpointer::new()),
        };
        let (status, Json(body)) = health_detailed(State(state)).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }
}
