//! Ollama client — local LLM runner speaking its native `/api/chat`.

use async_trait::async_trait;
use mesh_core::messages::{Message, MessageContent, MessageRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::LocalLlmConfig;
use crate::error::{LlmError, Result};
use crate::model::{ChatRequest, ChatResponse, FinishReason, Model, UsageMetadata};
use crate::provider_utils::{ModelInfo, ProviderUtils};

#[derive(Clone)]
pub struct OllamaClient {
    config: LocalLlmConfig,
    client: Client,
    current_model: String,
}

impl OllamaClient {
    pub fn new(config: LocalLlmConfig) -> Self {
        let current_model = config.model.clone();
        let client = Client::builder().timeout(config.timeout).build().expect("failed to build HTTP client");
        Self { config, client, current_model }
    }

    pub async fn check_health(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn convert_message(msg: &Message) -> OllamaMessage {
        OllamaMessage {
            role: match &msg.role {
                MessageRole::System => "system".to_string(),
                MessageRole::Human => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
                MessageRole::Tool => "user".to_string(),
                MessageRole::Custom(role) => role.clone(),
            },
            content: msg.text().unwrap_or("").to_string(),
        }
    }

    fn convert_response(&self, resp: OllamaResponse) -> ChatResponse {
        let message = Message {
            id: None,
            role: MessageRole::Assistant,
            content: MessageContent::Text(resp.message.content),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            metadata: None,
        };

        let usage = if resp.prompt_eval_count.is_some() || resp.eval_count.is_some() {
            Some(UsageMetadata::new(
                resp.prompt_eval_count.unwrap_or(0) as u64,
                resp.eval_count.unwrap_or(0) as u64,
            ))
        } else {
            None
        };

        ChatResponse { message, finish_reason: FinishReason::EndTurn, usage, reasoning: None }
    }
}

#[async_trait]
impl Model for OllamaClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.config.base_url);
        let messages: Vec<OllamaMessage> = request.messages.iter().map(Self::convert_message).collect();

        let mut options = HashMap::new();
        if let Some(temp) = request.config.temperature {
            options.insert("temperature", serde_json::Value::from(temp));
        }
        if let Some(top_p) = request.config.top_p {
            options.insert("top_p", serde_json::Value::from(top_p));
        }

        let body = OllamaRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
            options: if options.is_empty() { None } else { Some(options) },
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ServiceUnavailable(format!("ollama {status}: {text}")));
        }

        let parsed: OllamaResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(self.convert_response(parsed))
    }

    async fn is_available(&self) -> Result<bool> {
        self.check_health().await
    }

    fn model_id(&self) -> &str {
        &self.current_model
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<HashMap<&'static str, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[async_trait]
impl ProviderUtils for OllamaClient {
    async fn ping(&self) -> Result<bool> {
        self.check_health().await
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = self.client.get(&url).send().await.map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            return Err(LlmError::ServiceUnavailable("failed to fetch models from ollama".into()));
        }

        #[derive(Deserialize)]
        struct OllamaModelsResponse {
            models: Vec<OllamaModelInfo>,
        }
        #[derive(Deserialize)]
        struct OllamaModelInfo {
            name: String,
        }

        let parsed: OllamaModelsResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| ModelInfo::new(&m.name).with_name(&m.name)).collect())
    }

    async fn use_model(&mut self, model: impl Into<String> + Send) -> Result<String> {
        let model = model.into();
        self.current_model = model.clone();
        self.config.model = model.clone();
        Ok(model)
    }

    fn current_model(&self) -> &str {
        &self.current_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_conversion_maps_human_to_user() {
        let msg = Message::human("Hello");
        let converted = OllamaClient::convert_message(&msg);
        assert_eq!(converted.role, "user");
        assert_eq!(converted.content, "Hello");
    }

    #[test]
    fn current_model_reflects_the_configured_model() {
        let client = OllamaClient::new(LocalLlmConfig::new("http://localhost:11434", "llama2"));
        assert_eq!(client.current_model(), "llama2");
        assert_eq!(client.model_id(), "llama2");
    }
}
