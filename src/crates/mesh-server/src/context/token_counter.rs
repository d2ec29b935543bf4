//! Fallback token estimation.
//!
//! Used only when an aggregated run result omits usage metrics entirely —
//! the normal path folds whatever a provider reports through
//! `mesh_events::usage`; this is the degrade-gracefully path for providers
//! that never send one.

use serde_json::Value;

/// Token count result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: usize,
    pub chars: usize,
}

impl TokenCount {
    pub fn new(tokens: usize, chars: usize) -> Self {
        Self { tokens, chars }
    }

    pub fn add(&mut self, other: TokenCount) {
        self.tokens += other.tokens;
        self.chars += other.chars;
    }
}

/// Character-based token estimator, calibrated per model family.
pub struct TokenCounter {
    tokens_per_char: f32,
}

impl TokenCounter {
    pub fn new(model: impl AsRef<str>) -> Self {
        Self { tokens_per_char: Self::tokens_per_char_for(model.as_ref()) }
    }

    fn tokens_per_char_for(model: &str) -> f32 {
        if model.contains("gpt") || model.contains("openai") {
            0.25
        } else if model.contains("claude") || model.contains("anthropic") {
            0.27
        } else if model.contains("llama") {
            0.23
        } else {
            0.25
        }
    }

    pub fn count_text(&self, text: &str) -> TokenCount {
        let chars = text.len();
        let tokens = (chars as f32 * self.tokens_per_char).ceil() as usize;
        TokenCount::new(tokens, chars)
    }

    /// Estimates tokens for an arbitrary JSON payload (a node result's
    /// `content`, typically) by counting its serialized text.
    pub fn count_value(&self, value: &Value) -> TokenCount {
        let json_str = serde_json::to_string(value).unwrap_or_default();
        let mut count = self.count_text(&json_str);
        count.add(TokenCount::new(5, 0));
        count
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new("claude-3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_text_scales_with_length() {
        let counter = TokenCounter::new("gpt-4");
        let count = counter.count_text("Hello, world!");
        assert!(count.tokens >= 3 && count.tokens <= 4);
        assert_eq!(count.chars, 13);
    }

    #[test]
    fn claude_and_gpt_estimates_are_close() {
        let gpt = TokenCounter::new("gpt-4").count_text("Test message");
        let claude = TokenCounter::new("claude-3").count_text("Test message");
        assert!(claude.tokens >= gpt.tokens || gpt.tokens.abs_diff(claude.tokens) <= 1);
    }

    #[test]
    fn count_value_includes_formatting_overhead() {
        let counter = TokenCounter::default();
        let count = counter.count_value(&serde_json::json!({"text": "hi"}));
        assert!(count.tokens > 5);
    }
}
