//! Resolves an [`AgentSpec::model_id`](mesh_events::AgentSpec) string to a
//! concrete [`Model`] adapter.
//!
//! A model id is `"<provider>:<model>"` (e.g. `"claude:claude-3-5-sonnet"`,
//! `"ollama:llama3"`). Unprefixed ids default to `claude`, matching this
//! runtime's primary provider. Remote providers read their API key from the
//! environment variable their client needs; a missing key fails the run at
//! resolution time rather than on the first request.

use std::sync::Arc;
use std::time::Duration;

use mesh_llm::config::{LocalLlmConfig, RemoteLlmConfig};
use mesh_llm::local::OllamaClient;
use mesh_llm::mock::MockModel;
use mesh_llm::model::Model;
use mesh_llm::remote::{ClaudeClient, GeminiClient, OpenAiClient};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelResolutionError {
    #[error("unknown model provider '{0}'")]
    UnknownProvider(String),
    #[error("missing API key: {0}")]
    MissingApiKey(#[from] mesh_llm::error::LlmError),
}

/// Provider-specific defaults this runtime ships with — base URLs and the
/// environment variable each remote provider reads its key from.
struct ProviderDefaults {
    env_var: &'static str,
    base_url: &'static str,
}

fn provider_defaults(provider: &str) -> Option<ProviderDefaults> {
    match provider {
        "claude" | "anthropic" => Some(ProviderDefaults { env_var: "ANTHROPIC_API_KEY", base_url: "https://api.anthropic.com" }),
        "openai" => Some(ProviderDefaults { env_var: "OPENAI_API_KEY", base_url: "https://api.openai.com/v1" }),
        "gemini" | "google" => Some(ProviderDefaults { env_var: "GEMINI_API_KEY", base_url: "https://generativelanguage.googleapis.com" }),
        _ => None,
    }
}

/// Splits `"provider:model"` into its parts, defaulting to `claude` when no
/// provider prefix is present.
fn split_model_id(model_id: &str) -> (&str, &str) {
    match model_id.split_once(':') {
        Some((provider, model)) => (provider, model),
        None => ("claude", model_id),
    }
}

/// Resolves a model id into a live [`Model`] adapter. `mock:<reply>` always
/// resolves to a no-network [`MockModel`], for local development and tests
/// without provider credentials.
pub fn resolve_model(model_id: &str) -> Result<Arc<dyn Model>, ModelResolutionError> {
    let (provider, model) = split_model_id(model_id);

    if provider == "mock" {
        return Ok(Arc::new(MockModel::new(model_id, model)));
    }

    if provider == "ollama" {
        let base_url = std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
        let config = LocalLlmConfig::new(base_url, model).with_timeout(Duration::from_secs(120));
        return Ok(Arc::new(OllamaClient::new(config)));
    }

    let defaults = provider_defaults(provider).ok_or_else(|| ModelResolutionError::UnknownProvider(provider.to_string()))?;
    let config = RemoteLlmConfig::from_env(defaults.env_var, defaults.base_url, model)?;

    let client: Arc<dyn Model> = match provider {
        "openai" => Arc::new(OpenAiClient::new(config)),
        "gemini" | "google" => Arc::new(GeminiClient::new(config)),
        _ => Arc::new(ClaudeClient::new(config)),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprefixed_id_defaults_to_claude() {
        assert_eq!(split_model_id("claude-3-5-sonnet"), ("claude", "claude-3-5-sonnet"));
    }

    #[test]
    fn prefixed_id_splits_provider_and_model() {
        assert_eq!(split_model_id("openai:gpt-4o"), ("openai", "gpt-4o"));
    }

    #[test]
    fn mock_provider_resolves_without_env_vars() {
        let model = resolve_model("mock:canned reply").unwrap();
        assert_eq!(model.model_id(), "mock:canned reply");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = resolve_model("carrier-pigeon:v1").unwrap_err();
        assert!(matches!(err, ModelResolutionError::UnknownProvider(_)));
    }

    #[test]
    fn missing_api_key_surfaces_as_resolution_error() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let err = resolve_model("claude:claude-3-5-sonnet").unwrap_err();
        assert!(matches!(err, ModelResolutionError::MissingApiKey(_)));
    }
}
