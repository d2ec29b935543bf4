//! Errors produced while resolving or invoking a tool.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum ToolError {
    #[error("tool '{0}' not found. Available tools: {1}")]
    NotFound(String, String),

    #[error("invalid arguments for tool '{tool}': {error}")]
    InvalidArguments { tool: String, error: String },

    #[error("tool '{tool}' execution failed: {error}")]
    ExecutionFailed { tool: String, error: String },
}
