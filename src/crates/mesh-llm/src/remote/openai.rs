//! OpenAI-compatible chat-completions client. The wire shape this adapter
//! speaks (Bearer auth, `/chat/completions`, `choices[0].message`) is shared
//! by enough providers that this is the adapter to copy for any other
//! OpenAI-compatible endpoint.

use async_trait::async_trait;
use mesh_core::messages::{Message, MessageContent, MessageRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::model::{ChatRequest, ChatResponse, FinishReason, Model, UsageMetadata};
use crate::provider_utils::{ModelInfo, ProviderUtils};

pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
    current_model: String,
}

impl OpenAiClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let current_model = config.model.clone();
        let client = Client::builder().timeout(config.timeout).build().expect("failed to build HTTP client");
        Self { config, client, current_model }
    }

    fn convert_message(msg: &Message) -> OpenAiMessage {
        OpenAiMessage {
            role: match &msg.role {
                MessageRole::System => "system".to_string(),
                MessageRole::Human => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
                MessageRole::Tool => "tool".to_string(),
                MessageRole::Custom(role) => role.clone(),
            },
            content: msg.text().unwrap_or("").to_string(),
        }
    }

    fn finish_reason(raw: &str) -> FinishReason {
        match raw {
            "tool_calls" | "function_call" => FinishReason::ToolUse,
            "length" => FinishReason::MaxTokens,
            _ => FinishReason::EndTurn,
        }
    }

    fn status_to_error(status: reqwest::StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 => LlmError::AuthenticationError(body),
            429 => LlmError::RateLimitExceeded(body),
            404 => LlmError::ModelNotFound(body),
            _ => LlmError::ServiceUnavailable(format!("openai {status}: {body}")),
        }
    }
}

#[async_trait]
impl Model for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let messages: Vec<OpenAiMessage> = request.messages.iter().map(Self::convert_message).collect();

        let body = OpenAiRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.config.temperature,
            max_tokens: request.config.max_tokens,
            top_p: request.config.top_p,
            frequency_penalty: request.config.frequency_penalty,
            presence_penalty: request.config.presence_penalty,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::HttpError)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, text));
        }

        let parsed: OpenAiResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("openai response had no choices".into()))?;

        let message = Message {
            id: None,
            role: MessageRole::Assistant,
            content: MessageContent::Text(choice.message.content),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            metadata: None,
        };

        let usage = parsed
            .usage
            .map(|u| UsageMetadata::new(u.prompt_tokens as u64, u.completion_tokens as u64));

        Ok(ChatResponse {
            message,
            finish_reason: Self::finish_reason(choice.finish_reason.as_deref().unwrap_or("stop")),
            usage,
            reasoning: None,
        })
    }

    fn model_id(&self) -> &str {
        &self.current_model
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[async_trait]
impl ProviderUtils for OpenAiClient {
    async fn ping(&self) -> Result<bool> {
        let url = format!("{}/models", self.config.base_url);
        match self.client.get(&url).bearer_auth(&self.config.api_key).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo::new(&self.current_model)])
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
    fn tool_calls_finish_reason_maps_to_tool_use() {
        assert_eq!(OpenAiClient::finish_reason("tool_calls"), FinishReason::ToolUse);
        assert_eq!(OpenAiClient::finish_reason("length"), FinishReason::MaxTokens);
        assert_eq!(OpenAiClient::finish_reason("stop"), FinishReason::EndTurn);
    }

    #[test]
    fn message_conversion_maps_system_role() {
        let msg = Message::system("be terse");
        let converted = OpenAiClient::convert_message(&msg);
        assert_eq!(converted.role, "system");
    }

    #[test]
    fn unauthorized_status_becomes_an_authentication_error() {
        let err = OpenAiClient::status_to_error(reqwest::StatusCode::UNAUTHORIZED, "bad key".into());
        assert!(err.is_auth_error());
    }

    #[test]
    fn rate_limited_status_is_retryable() {
        let err = OpenAiClient::status_to_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert!(err.is_retryable());
    }
}
