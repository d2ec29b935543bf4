//! HTTP surface for run submission and history.
//!
//! Provides the `/api/run` SSE endpoint, `/api/history` read endpoints, and
//! a health check, wired together in [`routes`].

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use middleware::cors_layer;
pub use response::{ErrorResponse, PaginatedResponse, SuccessResponse};
pub use routes::create_router;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::api::error::{ApiError, ApiResult};
    pub use crate::api::models::*;
    pub use crate::api::response::*;
}
