//! Google Gemini client — `parts`/`role` request shape, API key passed as a
//! query parameter rather than a header, and no native `system` role (a
//! system instruction is prepended as a `[System]`-tagged user turn).

use async_trait::async_trait;
use mesh_core::messages::{Message, MessageContent, MessageRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::model::{ChatRequest, ChatResponse, FinishReason, Model, UsageMetadata};
use crate::provider_utils::{ModelInfo, ProviderUtils};

pub struct GeminiClient {
    config: RemoteLlmConfig,
    client: Client,
    current_model: String,
}

impl GeminiClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let current_model = config.model.clone();
        let client = Client::builder().timeout(config.timeout).build().expect("failed to build HTTP client");
        Self { config, client, current_model }
    }

    fn convert_messages(messages: &[Message]) -> Vec<GeminiContent> {
        messages
            .iter()
            .map(|msg| {
                let text = msg.text().unwrap_or("").to_string();
                match &msg.role {
                    MessageRole::System => {
                        GeminiContent { role: "user".into(), parts: vec![GeminiPart { text: format!("[System] {text}") }] }
                    }
                    MessageRole::Human | MessageRole::Tool | MessageRole::Custom(_) => {
                        GeminiContent { role: "user".into(), parts: vec![GeminiPart { text }] }
                    }
                    MessageRole::Assistant => {
                        GeminiContent { role: "model".into(), parts: vec![GeminiPart { text }] }
                    }
                }
            })
            .collect()
    }

    fn finish_reason(raw: &str) -> FinishReason {
        match raw {
            "MAX_TOKENS" => FinishReason::MaxTokens,
            _ => FinishReason::EndTurn,
        }
    }

    fn status_to_error(status: reqwest::StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthenticationError(body),
            429 => LlmError::RateLimitExceeded(body),
            404 => LlmError::ModelNotFound(body),
            _ => LlmError::ServiceUnavailable(format!("gemini {status}: {body}")),
        }
    }
}

#[async_trait]
impl Model for GeminiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );

        let generation_config = GenerationConfig {
            temperature: request.config.temperature,
            top_p: request.config.top_p,
            max_output_tokens: request.config.max_tokens,
        };

        let body = GeminiRequest {
            contents: Self::convert_messages(&request.messages),
            generation_config: Some(generation_config),
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(LlmError::HttpError)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, text));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("gemini response had no candidates".into()))?;

        let text = candidate.content.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join("");

        let message = Message {
            id: None,
            role: MessageRole::Assistant,
            content: MessageContent::Text(text),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            metadata: None,
        };

        let usage = parsed
            .usage_metadata
            .map(|u| UsageMetadata::new(u.prompt_token_count as u64, u.candidates_token_count as u64));

        Ok(ChatResponse {
            message,
            finish_reason: Self::finish_reason(candidate.finish_reason.as_deref().unwrap_or("STOP")),
            usage,
            reasoning: None,
        })
    }

    fn model_id(&self) -> &str {
        &self.current_model
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "maxOutputTokens")]
    max_output_tokens: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: usize,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: usize,
}

#[async_trait]
impl ProviderUtils for GeminiClient {
    async fn ping(&self) -> Result<bool> {
        let url = format!("{}/models?key={}", self.config.base_url, self.config.api_key);
        match self.client.get(&url).send().await {
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
    fn assistant_messages_map_to_model_role() {
        let messages = vec![Message::human("hi"), Message::assistant("hello")];
        let converted = GeminiClient::convert_messages(&messages);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "model");
    }

    #[test]
    fn system_messages_become_tagged_user_turns() {
        let messages = vec![Message::system("be terse")];
        let converted = GeminiClient::convert_messages(&messages);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[0].parts[0].text, "[System] be terse");
    }

    #[test]
    fn max_tokens_finish_reason_is_recognized() {
        assert_eq!(GeminiClient::finish_reason("MAX_TOKENS"), FinishReason::MaxTokens);
        assert_eq!(GeminiClient::finish_reason("STOP"), FinishReason::EndTurn);
    }
}
