//! Run-level error taxonomy: the codes a driver can terminate
//! a run with, and the few cross-cutting error kinds the supervisor itself
//! raises (distinct from `mesh_core::error::OrchestratorError`, which this
//! module wraps as the `Orchestration` variant).

use thiserror::Error;

/// The `code` field of a terminal `error` SSE record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorCode {
    TokenBudgetExceeded,
    RunTimeoutExceeded,
    RunIdleTimeoutExceeded,
    ToolPolicyExceeded,
    AgentReviewContractViolation,
    AgentReviewNodeBudgetExceeded,
    ClientDisconnected,
    ModelStreamIncomplete,
}

impl RunErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunErrorCode::TokenBudgetExceeded => "TOKEN_BUDGET_EXCEEDED",
            RunErrorCode::RunTimeoutExceeded => "RUN_TIMEOUT_EXCEEDED",
            RunErrorCode::RunIdleTimeoutExceeded => "RUN_IDLE_TIMEOUT_EXCEEDED",
            RunErrorCode::ToolPolicyExceeded => "TOOL_POLICY_EXCEEDED",
            RunErrorCode::AgentReviewContractViolation => "AGENT_REVIEW_CONTRACT_VIOLATION",
            RunErrorCode::AgentReviewNodeBudgetExceeded => "AGENT_REVIEW_NODE_BUDGET_EXCEEDED",
            RunErrorCode::ClientDisconnected => "CLIENT_DISCONNECTED",
            RunErrorCode::ModelStreamIncomplete => "MODEL_STREAM_INCOMPLETE",
        }
    }
}

/// A run-terminating error, with the code carried when one applies. An
/// `Orchestration` failure with no distinctive budget/policy code still
/// terminates the run as `failed` but has no `code` field in the wire
/// record.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("{message}")]
    Budget { code: RunErrorCode, message: String },

    #[error("orchestration error: {0}")]
    Orchestration(#[from] mesh_core::error::OrchestratorError),

    #[error("model stream ended before an aggregated result arrived")]
    ModelStreamIncomplete,

    /// Detected via transport close or write failure. Never surfaced to the
    /// consumer as an `error` record — persisted as `interrupted` instead.
    #[error("consumer disconnected")]
    Disconnected,
}

impl RunError {
    pub fn code(&self) -> Option<RunErrorCode> {
        match self {
            RunError::Budget { code, .. } => Some(*code),
            RunError::ModelStreamIncomplete => Some(RunErrorCode::ModelStreamIncomplete),
            RunError::Disconnected => Some(RunErrorCode::ClientDisconnected),
            RunError::Orchestration(_) => None,
        }
    }

    pub fn token_budget_exceeded(observed_total_tokens: u64, limit: u64) -> Self {
        RunError::Budget {
            code: RunErrorCode::TokenBudgetExceeded,
            message: format!("observed total tokens {observed_total_tokens} exceeds budget {limit}"),
        }
    }

    pub fn run_timeout_exceeded(elapsed_ms: u64, limit_ms: u64) -> Self {
        RunError::Budget {
            code: RunErrorCode::RunTimeoutExceeded,
            message: format!("run exceeded wall-clock budget of {limit_ms}ms after {elapsed_ms}ms"),
        }
    }

    pub fn run_idle_timeout_exceeded(idle_ms: u64) -> Self {
        RunError::Budget {
            code: RunErrorCode::RunIdleTimeoutExceeded,
            message: format!("no event received for {idle_ms}ms"),
        }
    }

    pub fn tool_policy_exceeded(tool_name: &str, count: u64, limit: u64) -> Self {
        RunError::Budget {
            code: RunErrorCode::ToolPolicyExceeded,
            message: format!("{tool_name}: {count}/{limit}"),
        }
    }

    pub fn agent_review_contract_violation(message: impl Into<String>) -> Self {
        RunError::Budget { code: RunErrorCode::AgentReviewContractViolation, message: message.into() }
    }

    pub fn agent_review_node_budget_exceeded(message: impl Into<String>) -> Self {
        RunError::Budget { code: RunErrorCode::AgentReviewNodeBudgetExceeded, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_carries_its_code() {
        let err = RunError::token_budget_exceeded(120, 100);
        assert_eq!(err.code(), Some(RunErrorCode::TokenBudgetExceeded));
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn orchestration_error_has_no_code() {
        let inner = mesh_core::error::OrchestratorError::Validation("bad graph".into());
        let err = RunError::Orchestration(inner);
        assert_eq!(err.code(), None);
    }

    #[test]
    fn disconnect_maps_to_client_disconnected() {
        assert_eq!(RunError::Disconnected.code(), Some(RunErrorCode::ClientDisconnected));
    }
}
