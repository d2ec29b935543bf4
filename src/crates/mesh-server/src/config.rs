//! Environment-driven server configuration.
//!
//! Every knob is optional and falls back to a documented default; values
//! below the documented minimum are clamped up to it with a `tracing::warn!`
//! line rather than rejected, matching how the rest of this runtime prefers
//! to degrade gracefully over refusing to start.

use std::path::PathBuf;

/// Server configuration, read once at startup from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub max_run_wall_clock_ms: u64,
    pub max_stream_idle_ms: u64,
    pub max_run_total_tokens: u64,
    pub max_tool_uses_per_run: u64,
    pub max_tool_uses_per_tool: u64,
    pub max_persisted_stream_events_per_node: u64,
    pub aws_region: String,
    pub history_dir: PathBuf,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_MAX_RUN_WALL_CLOCK_MS: u64 = 300_000;
    pub const MIN_MAX_RUN_WALL_CLOCK_MS: u64 = 10_000;
    pub const DEFAULT_MAX_STREAM_IDLE_MS: u64 = 60_000;
    pub const MIN_MAX_STREAM_IDLE_MS: u64 = 5_000;
    pub const DEFAULT_MAX_RUN_TOTAL_TOKENS: u64 = 100_000;
    pub const MIN_MAX_RUN_TOTAL_TOKENS: u64 = 1_000;
    pub const DEFAULT_MAX_TOOL_USES_PER_RUN: u64 = 24;
    pub const DEFAULT_MAX_TOOL_USES_PER_TOOL: u64 = 8;
    pub const DEFAULT_MAX_PERSISTED_STREAM_EVENTS_PER_NODE: u64 = 120;
    pub const DEFAULT_AWS_REGION: &'static str = "us-west-2";
    pub const DEFAULT_HISTORY_DIR: &'static str = "./data";

    /// Reads and clamps every knob from the process environment.
    pub fn from_env() -> Self {
        Self {
            port: env_u16("PORT", Self::DEFAULT_PORT),
            max_run_wall_clock_ms: env_u64_clamped(
                "MAX_RUN_WALL_CLOCK_MS",
                Self::DEFAULT_MAX_RUN_WALL_CLOCK_MS,
                Self::MIN_MAX_RUN_WALL_CLOCK_MS,
            ),
            max_stream_idle_ms: env_u64_clamped(
                "MAX_STREAM_IDLE_MS",
                Self::DEFAULT_MAX_STREAM_IDLE_MS,
                Self::MIN_MAX_STREAM_IDLE_MS,
            ),
            max_run_total_tokens: env_u64_clamped(
                "MAX_RUN_TOTAL_TOKENS",
                Self::DEFAULT_MAX_RUN_TOTAL_TOKENS,
                Self::MIN_MAX_RUN_TOTAL_TOKENS,
            ),
            max_tool_uses_per_run: env_u64_clamped(
                "MAX_TOOL_USES_PER_RUN",
                Self::DEFAULT_MAX_TOOL_USES_PER_RUN,
                1,
            ),
            max_tool_uses_per_tool: env_u64_clamped(
                "MAX_TOOL_USES_PER_TOOL",
                Self::DEFAULT_MAX_TOOL_USES_PER_TOOL,
                1,
            ),
            max_persisted_stream_events_per_node: env_u64_clamped(
                "MAX_PERSISTED_STREAM_EVENTS_PER_NODE",
                Self::DEFAULT_MAX_PERSISTED_STREAM_EVENTS_PER_NODE,
                1,
            ),
            aws_region: std::env::var("AWS_REGION").unwrap_or_else(|_| Self::DEFAULT_AWS_REGION.to_string()),
            history_dir: std::env::var("HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_HISTORY_DIR)),
        }
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}/history.db?mode=rwc", self.history_dir.display())
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64_clamped(key: &str, default: u64, min: u64) -> u64 {
    let Some(raw) = std::env::var(key).ok() else { return default };
    let Ok(parsed) = raw.parse::<u64>() else {
        tracing::warn!(%key, value = %raw, "could not parse environment variable, using default");
        return default;
    };
    if parsed < min {
        tracing::warn!(%key, value = parsed, %min, "clamping environment variable up to minimum");
        min
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in [
            "PORT",
            "MAX_RUN_WALL_CLOCK_MS",
            "MAX_STREAM_IDLE_MS",
            "MAX_RUN_TOTAL_TOKENS",
            "MAX_TOOL_USES_PER_RUN",
            "MAX_TOOL_USES_PER_TOOL",
            "MAX_PERSISTED_STREAM_EVENTS_PER_NODE",
            "AWS_REGION",
            "HISTORY_DIR",
        ] {
            std::env::remove_var(key);
        }

        let cfg = ServerConfig::from_env();
        assert_eq!(cfg.port, ServerConfig::DEFAULT_PORT);
        assert_eq!(cfg.max_stream_idle_ms, ServerConfig::DEFAULT_MAX_STREAM_IDLE_MS);
        assert_eq!(cfg.aws_region, "us-west-2");
    }

    #[test]
    fn below_minimum_is_clamped_up() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MAX_STREAM_IDLE_MS", "100");
        let cfg = ServerConfig::from_env();
        assert_eq!(cfg.max_stream_idle_ms, ServerConfig::MIN_MAX_STREAM_IDLE_MS);
        std::env::remove_var("MAX_STREAM_IDLE_MS");
    }

    #[test]
    fn valid_value_above_minimum_passes_through() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MAX_RUN_TOTAL_TOKENS", "250000");
        let cfg = ServerConfig::from_env();
        assert_eq!(cfg.max_run_total_tokens, 250_000);
        std::env::remove_var("MAX_RUN_TOTAL_TOKENS");
    }
}
