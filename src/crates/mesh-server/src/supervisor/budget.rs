//! Per-run token, wall-clock, idle, and tool-use budget tracking.
//!
//! Wraps `mesh_events::usage`'s counter-delta machinery with the
//! run-scoped bookkeeping the driver needs to decide when to terminate a
//! run.

use std::time::Instant;

use mesh_events::model::{TokenAccumulator, ToolUseGuardState};
use mesh_events::usage::{DeltaWindow, ModelUsageTable};

use crate::error::RunError;

/// Tracks token usage, wall-clock elapsed time, and tool-use counts for a
/// single run.
pub struct RunBudget {
    run_started_at: Instant,
    last_event_at: Instant,
    max_run_wall_clock_ms: u64,
    max_stream_idle_ms: u64,
    max_run_total_tokens: u64,

    run_total: TokenAccumulator,
    per_node_windows: std::collections::HashMap<String, DeltaWindow>,
    per_node_totals: std::collections::HashMap<String, TokenAccumulator>,
    per_model: ModelUsageTable,

    tool_guard: ToolUseGuardState,
    node_start_count: u64,
    coordination_tool_uses: u64,
}

impl RunBudget {
    pub fn new(max_run_wall_clock_ms: u64, max_stream_idle_ms: u64, max_run_total_tokens: u64) -> Self {
        let now = Instant::now();
        Self {
            run_started_at: now,
            last_event_at: now,
            max_run_wall_clock_ms,
            max_stream_idle_ms,
            max_run_total_tokens,
            run_total: TokenAccumulator::default(),
            per_node_windows: std::collections::HashMap::new(),
            per_node_totals: std::collections::HashMap::new(),
            per_model: ModelUsageTable::new(),
            tool_guard: ToolUseGuardState::new(),
            node_start_count: 0,
            coordination_tool_uses: 0,
        }
    }

    pub fn observed_total_tokens(&self) -> u64 {
        self.run_total.total_tokens
    }

    pub fn per_model_usage(&self) -> std::collections::BTreeMap<String, TokenAccumulator> {
        self.per_model.snapshot()
    }

    pub fn per_node_usage(&self, node_id: &str) -> TokenAccumulator {
        self.per_node_totals.get(node_id).copied().unwrap_or_default()
    }

    /// Records a newly-reported cumulative `{input, output}` usage snapshot
    /// for `node_id`/`model_id`, folding the delta into the run total, the
    /// node's accumulator, and the model's accumulator. Returns the error to
    /// terminate the run with, if the run total now exceeds budget.
    pub fn record_usage(
        &mut self,
        node_id: &str,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<RunError> {
        let window = self.per_node_windows.entry(node_id.to_string()).or_default();
        let node_acc = self.per_node_totals.entry(node_id.to_string()).or_default();
        let before = *node_acc;
        window.apply(node_acc, input_tokens, output_tokens);
        let delta = TokenAccumulator {
            input_tokens: node_acc.input_tokens - before.input_tokens,
            output_tokens: node_acc.output_tokens - before.output_tokens,
            total_tokens: node_acc.total_tokens - before.total_tokens,
        };

        self.run_total.input_tokens += delta.input_tokens;
        self.run_total.output_tokens += delta.output_tokens;
        self.run_total.total_tokens += delta.total_tokens;
        self.per_model.record(model_id, delta);

        self.check_token_budget()
    }

    /// Folds a run-scoped cumulative total (the terminal aggregated result)
    /// using `max` semantics rather than delta semantics, since this number
    /// already reports cumulative usage rather than a per-event increment.
    pub fn record_run_scoped_total(&mut self, reported_total_tokens: u64) -> Option<RunError> {
        self.run_total.total_tokens = mesh_events::usage::fold_run_scoped_total(self.run_total.total_tokens, reported_total_tokens);
        self.check_token_budget()
    }

    fn check_token_budget(&self) -> Option<RunError> {
        if self.run_total.total_tokens > self.max_run_total_tokens {
            Some(RunError::token_budget_exceeded(self.run_total.total_tokens, self.max_run_total_tokens))
        } else {
            None
        }
    }

    /// Called once per event pulled off the fan-in stream — resets the idle
    /// clock and checks both wall-clock and idle deadlines.
    pub fn touch(&mut self) -> Option<RunError> {
        let now = Instant::now();
        self.last_event_at = now;
        self.check_deadlines(now)
    }

    fn check_deadlines(&self, now: Instant) -> Option<RunError> {
        let elapsed_ms = now.duration_since(self.run_started_at).as_millis() as u64;
        if elapsed_ms > self.max_run_wall_clock_ms {
            return Some(RunError::run_timeout_exceeded(elapsed_ms, self.max_run_wall_clock_ms));
        }
        let idle_ms = now.duration_since(self.last_event_at).as_millis() as u64;
        if idle_ms > self.max_stream_idle_ms {
            return Some(RunError::run_idle_timeout_exceeded(idle_ms));
        }
        None
    }

    /// Checked before blocking on the next upstream event — lets the driver
    /// size its idle-timeout wait without waiting for an event that may
    /// never come.
    pub fn remaining_idle_budget_ms(&self) -> u64 {
        let elapsed = self.last_event_at.elapsed().as_millis() as u64;
        self.max_stream_idle_ms.saturating_sub(elapsed)
    }

    pub fn remaining_wall_clock_budget_ms(&self) -> u64 {
        let elapsed = self.run_started_at.elapsed().as_millis() as u64;
        self.max_run_wall_clock_ms.saturating_sub(elapsed)
    }

    pub fn record_node_start(&mut self) {
        self.node_start_count += 1;
    }

    pub fn node_start_count(&self) -> u64 {
        self.node_start_count
    }

    /// Dedupe-and-count a tool use. Returns `false` when the id was already
    /// seen (a retry; no counters touched).
    pub fn record_tool_use(&mut self, tool_use_id: &str, tool_name: &str, coordination_tool_name: &str) -> bool {
        let fresh = self.tool_guard.record(tool_use_id, tool_name);
        if fresh && tool_name == coordination_tool_name {
            self.coordination_tool_uses += 1;
        }
        fresh
    }

    pub fn total_tool_uses(&self) -> u64 {
        self.tool_guard.total_tool_uses
    }

    pub fn per_tool_uses(&self, tool_name: &str) -> u64 {
        self.tool_guard.per_tool_uses.get(tool_name).copied().unwrap_or(0)
    }

    pub fn coordination_tool_uses(&self) -> u64 {
        self.coordination_tool_uses
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.run_started_at.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exceeded_once_total_crosses_limit() {
        let mut budget = RunBudget::new(300_000, 60_000, 100);
        assert!(budget.record_usage("alpha", "claude-3", 60, 0).is_none());
        let err = budget.record_usage("alpha", "claude-3", 0, 60).unwrap();
        assert_eq!(err.code(), Some(crate::error::RunErrorCode::TokenBudgetExceeded));
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn tool_use_dedup_by_id() {
        let mut budget = RunBudget::new(300_000, 60_000, 100_000);
        assert!(budget.record_tool_use("tu_1", "search", "swarm"));
        assert!(!budget.record_tool_use("tu_1", "search", "swarm"));
        assert_eq!(budget.total_tool_uses(), 1);
    }

    #[test]
    fn coordination_tool_uses_counted_separately() {
        let mut budget = RunBudget::new(300_000, 60_000, 100_000);
        budget.record_tool_use("tu_1", "swarm", "swarm");
        budget.record_tool_use("tu_2", "swarm", "swarm");
        budget.record_tool_use("tu_3", "search", "swarm");
        assert_eq!(budget.coordination_tool_uses(), 2);
        assert_eq!(budget.total_tool_uses(), 3);
    }

    #[test]
    fn per_node_usage_accumulates_independently() {
        let mut budget = RunBudget::new(300_000, 60_000, 1_000_000);
        budget.record_usage("alpha", "claude-3", 10, 5);
        budget.record_usage("beta", "gpt-4", 3, 2);
        assert_eq!(budget.per_node_usage("alpha").total_tokens, 15);
        assert_eq!(budget.per_node_usage("beta").total_tokens, 5);
        assert_eq!(budget.observed_total_tokens(), 20);
    }
}
