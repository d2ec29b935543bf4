//! Tool-use policy resolution and enforcement.
//!
//! Generalizes a pattern-allow/deny-list shape, the same one a request
//! router uses for matching rules, from routing *which agent pattern runs*
//! to bounding *which tools a run may call, and how often* — numeric caps
//! replace pattern priority, but the allow/deny-list resolution shape is
//! the same.

use std::collections::{BTreeMap, HashSet};

use mesh_events::model::RunMode;

use crate::error::RunError;

/// A block of policy knobs contributed by one layer (defaults, mode,
/// preset, or a per-run override) before resolution merges them.
#[derive(Debug, Clone, Default)]
pub struct PolicyOverride {
    pub max_total_tool_uses: Option<u64>,
    pub default_per_tool_limit: Option<u64>,
    pub per_tool_limits: BTreeMap<String, u64>,
    pub blocked_tools: HashSet<String>,
}

/// The resolved policy a run enforces for its lifetime.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    pub max_total_tool_uses: u64,
    pub default_per_tool_limit: u64,
    pub per_tool_limits: BTreeMap<String, u64>,
    pub blocked_tools: HashSet<String>,
}

impl ToolPolicy {
    /// Combines defaults, a per-mode block, an optional per-preset block,
    /// and an optional per-run override, later layers winning on conflict.
    pub fn resolve(
        defaults: &PolicyOverride,
        mode: RunMode,
        preset: Option<&PolicyOverride>,
        run_override: Option<&PolicyOverride>,
    ) -> Self {
        let mode_block = mode_defaults(mode);
        let mut max_total_tool_uses = defaults.max_total_tool_uses.unwrap_or(24);
        let mut default_per_tool_limit = defaults.default_per_tool_limit.unwrap_or(8);
        let mut per_tool_limits = defaults.per_tool_limits.clone();
        let mut blocked_tools = defaults.blocked_tools.clone();

        for layer in [Some(&mode_block), preset, run_override].into_iter().flatten() {
            if let Some(v) = layer.max_total_tool_uses {
                max_total_tool_uses = v;
            }
            if let Some(v) = layer.default_per_tool_limit {
                default_per_tool_limit = v;
            }
            per_tool_limits.extend(layer.per_tool_limits.clone());
            blocked_tools.extend(layer.blocked_tools.clone());
        }

        Self { max_total_tool_uses, default_per_tool_limit, per_tool_limits, blocked_tools }
    }

    pub fn limit_for(&self, tool_name: &str) -> u64 {
        self.per_tool_limits.get(tool_name).copied().unwrap_or(self.default_per_tool_limit)
    }

    /// Strips blocked tools from an agent's declared tool list, logging one
    /// line per run (not per tool) naming what was stripped.
    pub fn strip_blocked<'a>(&self, tools: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let mut stripped = Vec::new();
        let kept: Vec<&str> = tools
            .into_iter()
            .filter(|t| {
                if self.blocked_tools.contains(*t) {
                    stripped.push(*t);
                    false
                } else {
                    true
                }
            })
            .collect();
        if !stripped.is_empty() {
            tracing::warn!(blocked = ?stripped, "stripped blocked tools before run start");
        }
        kept
    }

    /// Checks a just-recorded (fresh, not a dedup-retry) tool use against
    /// the resolved caps. Call only after the use has already been counted
    /// in the budget.
    pub fn check(&self, tool_name: &str, total_tool_uses: u64, per_tool_uses: u64) -> Option<RunError> {
        if total_tool_uses > self.max_total_tool_uses {
            return Some(RunError::tool_policy_exceeded(tool_name, total_tool_uses, self.max_total_tool_uses));
        }
        let limit = self.limit_for(tool_name);
        if per_tool_uses > limit {
            return Some(RunError::tool_policy_exceeded(tool_name, per_tool_uses, limit));
        }
        None
    }
}

/// The coordination tool is forbidden outside swarm/graph runs — a single
/// agent has no one to hand off to.
fn mode_defaults(mode: RunMode) -> PolicyOverride {
    let mut block = PolicyOverride::default();
    if mode == RunMode::Single {
        block.blocked_tools.insert(mesh_core::swarm::COORDINATION_TOOL_NAME.to_string());
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_block_forbids_coordination_tool_in_single_mode() {
        let defaults = PolicyOverride::default();
        let policy = ToolPolicy::resolve(&defaults, RunMode::Single, None, None);
        assert!(policy.blocked_tools.contains(mesh_core::swarm::COORDINATION_TOOL_NAME));
    }

    #[test]
    fn swarm_mode_does_not_block_coordination_tool() {
        let defaults = PolicyOverride::default();
        let policy = ToolPolicy::resolve(&defaults, RunMode::Swarm, None, None);
        assert!(!policy.blocked_tools.contains(mesh_core::swarm::COORDINATION_TOOL_NAME));
    }

    #[test]
    fn run_override_wins_over_preset() {
        let defaults = PolicyOverride::default();
        let mut preset = PolicyOverride::default();
        preset.max_total_tool_uses = Some(10);
        let mut run_override = PolicyOverride::default();
        run_override.max_total_tool_uses = Some(5);

        let policy = ToolPolicy::resolve(&defaults, RunMode::Swarm, Some(&preset), Some(&run_override));
        assert_eq!(policy.max_total_tool_uses, 5);
    }

    #[test]
    fn per_tool_limit_falls_back_to_default() {
        let mut defaults = PolicyOverride::default();
        defaults.default_per_tool_limit = Some(3);
        defaults.per_tool_limits.insert("search".into(), 10);
        let policy = ToolPolicy::resolve(&defaults, RunMode::Swarm, None, None);

        assert_eq!(policy.limit_for("search"), 10);
        assert_eq!(policy.limit_for("unlisted_tool"), 3);
    }

    #[test]
    fn strip_blocked_removes_and_logs_once() {
        let mut defaults = PolicyOverride::default();
        defaults.blocked_tools.insert("dangerous".into());
        let policy = ToolPolicy::resolve(&defaults, RunMode::Swarm, None, None);

        let kept = policy.strip_blocked(["search", "dangerous", "calculator"]);
        assert_eq!(kept, vec!["search", "calculator"]);
    }

    #[test]
    fn check_raises_tool_policy_exceeded_over_total_cap() {
        let mut defaults = PolicyOverride::default();
        defaults.max_total_tool_uses = Some(2);
        let policy = ToolPolicy::resolve(&defaults, RunMode::Swarm, None, None);

        assert!(policy.check("search", 2, 1).is_none());
        let err = policy.check("search", 3, 1).unwrap();
        assert_eq!(err.code(), Some(crate::error::RunErrorCode::ToolPolicyExceeded));
    }

    #[test]
    fn check_raises_tool_policy_exceeded_over_per_tool_cap() {
        let mut defaults = PolicyOverride::default();
        defaults.per_tool_limits.insert("search".into(), 2);
        let policy = ToolPolicy::resolve(&defaults, RunMode::Swarm, None, None);

        assert!(policy.check("search", 1, 2).is_none());
        assert!(policy.check("search", 1, 3).is_some());
    }
}
