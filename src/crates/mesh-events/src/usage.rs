//! Counter-delta token accounting and model-id region normalization.
//!
//! LLM providers report *cumulative* usage per request within a session.
//! Between retries or agent cycles a provider may reset its cumulative
//! counter to zero; naively summing reported counters would then
//! double-count. The rule here treats a drop in the reported counter as the
//! start of a new additive window.

use std::collections::BTreeMap;

use crate::model::TokenAccumulator;

/// One dimension (input or output) of a running counter-delta window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    previous: u64,
}

impl Counter {
    /// Applies a newly-reported cumulative value and returns the delta to
    /// add to the accumulator.
    ///
    /// `delta = current >= previous ? current - previous : current`
    /// `nextPrevious = current >= previous ? current : previous + current`
    pub fn apply(&mut self, current: u64) -> u64 {
        let delta = if current >= self.previous {
            current - self.previous
        } else {
            current
        };
        self.previous = if current >= self.previous {
            current
        } else {
            self.previous + current
        };
        delta
    }
}

/// Per-node counter-delta accumulation state: tracks the previous
/// cumulative input/output counters seen from the provider, independent of
/// the totals already folded into `TokenAccumulator`.
#[derive(Debug, Clone, Default)]
pub struct DeltaWindow {
    input: Counter,
    output: Counter,
}

impl DeltaWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a freshly-reported `{input, output}` cumulative snapshot,
    /// folding the resulting deltas into `acc` and returning the total
    /// tokens added this call.
    pub fn apply(&mut self, acc: &mut TokenAccumulator, input: u64, output: u64) -> u64 {
        let d_in = self.input.apply(input);
        let d_out = self.output.apply(output);
        acc.input_tokens += d_in;
        acc.output_tokens += d_out;
        acc.total_tokens += d_in + d_out;
        d_in + d_out
    }
}

/// Free function form of [`DeltaWindow::apply`] for call sites that only
/// need a one-shot delta without keeping window state (e.g. applying a
/// single snapshot against an externally-owned `DeltaWindow`).
pub fn apply_delta(window: &mut DeltaWindow, acc: &mut TokenAccumulator, input: u64, output: u64) -> u64 {
    window.apply(acc, input, output)
}

/// Folds a run-scoped *cumulative total* (e.g. the terminal aggregated
/// result) using `max` semantics rather than delta semantics.
pub fn fold_run_scoped_total(observed_total_tokens: u64, reported: u64) -> u64 {
    observed_total_tokens.max(reported)
}

const REGION_PREFIXES: &[&str] = &["us", "eu", "apac", "global"];

/// Normalizes a model id of the form `<region>.<canonical>` to its
/// canonical form. Ids without a recognized region prefix pass through
/// unchanged. Idempotent: `normalize(normalize(id)) == normalize(id)`.
pub fn normalize_model_id(id: &str) -> &str {
    if let Some((prefix, rest)) = id.split_once('.') {
        if REGION_PREFIXES.contains(&prefix) && !rest.is_empty() {
            return rest;
        }
    }
    id
}

/// Per-model accumulator keyed by canonical model id, retaining the
/// first-seen display form for reporting.
#[derive(Debug, Clone, Default)]
pub struct ModelUsageTable {
    entries: BTreeMap<String, (String, TokenAccumulator)>,
}

impl ModelUsageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates `delta` tokens under the canonical bucket for `model_id`.
    pub fn record(&mut self, model_id: &str, delta: TokenAccumulator) {
        let canonical = normalize_model_id(model_id).to_string();
        let entry = self
            .entries
            .entry(canonical)
            .or_insert_with(|| (model_id.to_string(), TokenAccumulator::default()));
        entry.1.input_tokens += delta.input_tokens;
        entry.1.output_tokens += delta.output_tokens;
        entry.1.total_tokens += delta.total_tokens;
    }

    /// Snapshots the table keyed by each bucket's first-seen display form.
    pub fn snapshot(&self) -> BTreeMap<String, TokenAccumulator> {
        self.entries
            .values()
            .map(|(display, acc)| (display.clone(), *acc))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_delta_sums_plain_increases() {
        let mut c = Counter::default();
        assert_eq!(c.apply(10), 10);
        assert_eq!(c.apply(25), 15);
        assert_eq!(c.apply(25), 0);
    }

    #[test]
    fn counter_delta_treats_reset_as_new_window() {
        // mirrors spec scenario 6: (10,5) (20,10) (5,2) (10,5) -> in=25 out=12
        let mut acc = TokenAccumulator::default();
        let mut window = DeltaWindow::new();
        let total1 = window.apply(&mut acc, 10, 5);
        let total2 = window.apply(&mut acc, 20, 10);
        let total3 = window.apply(&mut acc, 5, 2);
        let total4 = window.apply(&mut acc, 10, 5);

        assert_eq!(acc.input_tokens, 25);
        assert_eq!(acc.output_tokens, 12);
        assert_eq!(acc.total_tokens, 37);
        assert_eq!(total1 + total2 + total3 + total4, 37);
    }

    #[test]
    fn region_normalization_is_idempotent_and_buckets_share_canonical() {
        assert_eq!(normalize_model_id("us.claude-3-sonnet"), "claude-3-sonnet");
        assert_eq!(normalize_model_id("eu.claude-3-sonnet"), "claude-3-sonnet");
        assert_eq!(
            normalize_model_id(normalize_model_id("apac.claude-3-sonnet")),
            normalize_model_id("apac.claude-3-sonnet")
        );
        assert_eq!(normalize_model_id("claude-3-sonnet"), "claude-3-sonnet");

        let mut table = ModelUsageTable::new();
        table.record(
            "us.claude-3-sonnet",
            TokenAccumulator { input_tokens: 10, output_tokens: 5, total_tokens: 15 },
        );
        table.record(
            "eu.claude-3-sonnet",
            TokenAccumulator { input_tokens: 1, output_tokens: 1, total_tokens: 2 },
        );
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        let (_, acc) = snapshot.iter().next().unwrap();
        assert_eq!(acc.total_tokens, 17);
    }

    #[test]
    fn run_scoped_total_uses_max_not_sum() {
        assert_eq!(fold_run_scoped_total(50, 80), 80);
        assert_eq!(fold_run_scoped_total(50, 30), 50);
    }
}
