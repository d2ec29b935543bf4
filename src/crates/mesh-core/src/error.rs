//! Error types for node, swarm, and graph orchestration.
//!
//! `OrchestratorError` covers failures raised while *building* or *driving*
//! an orchestrator. It does not carry the run-level budget/policy error
//! codes (`TOKEN_BUDGET_EXCEEDED`, `RUN_TIMEOUT_EXCEEDED`, ...) — those
//! belong to the supervisor in `mesh-server`, which wraps this error as
//! one variant of its own, richer error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised while constructing or driving a swarm or graph orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The orchestrator's structure is invalid (empty entry set, dangling
    /// edge reference, duplicate node id).
    #[error("orchestrator validation failed: {0}")]
    Validation(String),

    /// A node's executor raised during `stream`. For the graph path this is
    /// re-raised after the node's stop event is emitted (see
    /// [`crate::graph`]); for the swarm path it terminates the run directly.
    #[error("node '{node}' execution failed: {source}")]
    NodeExecution { node: String, source: String },

    /// `handoff_to_agent` was invoked with a target that isn't in the
    /// roster.
    #[error("handoff target '{0}' does not exist")]
    UnknownHandoffTarget(String),

    /// Tool injection found a node that already registers a tool under the
    /// coordination tool's name.
    #[error("node '{node}' already has a tool named '{tool_name}'")]
    ToolNameCollision { node: String, tool_name: String },

    /// A continuation limit (`maxHandoffs`, `maxIterations`,
    /// `maxNodeExecutions`, `executionTimeout`, or repetitive-handoff
    /// detection) was exceeded.
    #[error("continuation limit exceeded: {0}")]
    ContinuationLimitExceeded(String),

    /// A concurrent node in a graph batch reported an error into the
    /// fan-in merge queue.
    #[error("batch execution failed: {0}")]
    BatchExecution(String),

    /// A per-node timeout fired before the node's stream completed.
    #[error("node '{node}' timed out after {elapsed_ms}ms")]
    NodeTimeout { node: String, elapsed_ms: u64 },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] mesh_checkpoint::CheckpointError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_execution_error_formats_with_node_id() {
        let err = OrchestratorError::NodeExecution {
            node: "alpha".to_string(),
            source: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "node 'alpha' execution failed: boom");
    }
}
