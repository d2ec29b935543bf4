//! Small wire-level DTOs used directly by handlers, distinct from the
//! `mesh-events` model types that already have their own serde shapes.

use serde::{Deserialize, Serialize};

/// Body of `GET /health` and `GET /api/v1/system/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub history_store: String,
}

impl HealthResponse {
    pub fn new(status: impl Into<String>, history_store: impl Into<String>) -> Self {
        Self { status: status.into(), history_store: history_store.into() }
    }
}

/// Query parameters for `GET /api/history`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub anomalies_only: bool,
    #[serde(default)]
    pub sort_by_risk: bool,
}

fn default_limit() -> u32 {
    50
}
