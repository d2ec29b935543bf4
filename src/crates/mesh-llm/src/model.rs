//! The [`Model`] capability: a lazy sequence of content deltas terminated
//! by an aggregated result carrying usage metrics — the one piece of the
//! orchestrator this workspace treats as external, the LLM provider
//! adapter boundary.
//!
//! An [`Agent`](https://docs.rs/mesh-core) implementation built on top of a
//! `Model` is responsible for turning [`ChatResponse::finish_reason`] into
//! `mesh_core::agent::StopReason` and folding [`ChatResponse::usage`] into
//! its accumulator — this crate stops at the provider boundary.

use async_trait::async_trait;
use mesh_core::messages::Message;
use mesh_events::TokenAccumulator;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use futures::Stream;

use crate::error::Result;

/// A request to a chat model: conversation history plus generation config.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub config: ChatConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, config: ChatConfig::default() }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_reasoning(mut self, mode: ReasoningMode) -> Self {
        self.config.reasoning_mode = mode;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.config.tools = tools;
        self
    }
}

/// Generation parameters. Not every field is honored by every adapter;
/// implementations should ignore what they don't support rather than error.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub stop_sequences: Vec<String>,
    pub reasoning_mode: ReasoningMode,
    pub tools: Vec<ToolDefinition>,
}

/// Controls how a thinking model's reasoning content is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    /// Drop reasoning content entirely; only the final answer is returned.
    Disabled,
    /// Provider default — reasoning may appear inline in the message content.
    #[default]
    Default,
    /// Reasoning is extracted into [`ChatResponse::reasoning`] separately
    /// from the final answer.
    Separated,
}

impl ReasoningMode {
    pub fn should_capture(&self) -> bool {
        matches!(self, ReasoningMode::Separated)
    }
}

/// A function/tool definition a model may be told it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), parameters: None }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Why the model stopped generating. Maps onto
/// `mesh_core::agent::StopReason` in the agent implementation that wraps a
/// `Model`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Separated reasoning/thinking content for models that support it.
#[derive(Debug, Clone)]
pub struct ReasoningContent {
    pub content: String,
}

impl ReasoningContent {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into() }
    }
}

/// Token usage for one request, reusing the same accumulator shape the
/// run supervisor folds counter-deltas into.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageMetadata {
    pub accumulated: TokenAccumulator,
    pub reasoning_tokens: Option<u64>,
}

impl UsageMetadata {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            accumulated: TokenAccumulator {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
            },
            reasoning_tokens: None,
        }
    }

    pub fn with_reasoning(input_tokens: u64, output_tokens: u64, reasoning_tokens: u64) -> Self {
        Self { reasoning_tokens: Some(reasoning_tokens), ..Self::new(input_tokens, output_tokens) }
    }
}

/// The complete (non-streaming) result of a chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub finish_reason: FinishReason,
    pub usage: Option<UsageMetadata>,
    pub reasoning: Option<ReasoningContent>,
}

/// One piece of a streaming response: either a content delta or the
/// terminal aggregated result.
#[derive(Debug, Clone)]
pub enum ChatStreamEvent {
    Delta(String),
    Done(Box<ChatResponse>),
}

pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

/// Provider-agnostic interface to a chat-completion model.
///
/// Implementations handle converting messages to a provider's wire format,
/// making the request, and converting the response back. This crate does
/// not include live network calls against real vendor APIs in its test
/// suite — adapters are exercised against a local mock HTTP layer or not at
/// all, since this workspace never makes outbound network calls.
#[async_trait]
pub trait Model: Send + Sync {
    /// Generate a complete chat response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Stream a chat response as a sequence of content deltas terminated by
    /// the aggregated result.
    ///
    /// Default implementation falls back to [`Model::chat`] and replays it
    /// as a single delta followed by the terminal event — adapters that
    /// can't stream natively get a working (if less responsive) `Model` for
    /// free.
    async fn stream(&self, request: ChatRequest) -> Result<ChatEventStream> {
        let response = self.chat(request).await?;
        let text = response.message.text().unwrap_or("").to_string();
        let events = vec![Ok(ChatStreamEvent::Delta(text)), Ok(ChatStreamEvent::Done(Box::new(response)))];
        Ok(Box::pin(futures::stream::iter(events)))
    }

    /// Whether the provider is currently reachable. Defaults to `true` —
    /// remote providers with no cheap health check can leave this as-is.
    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }

    /// Canonical model identifier used for pricing/usage-table lookups.
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::messages::MessageRole;

    struct Echo(String);

    #[async_trait]
    impl Model for Echo {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            let last = request.messages.last().and_then(|m| m.text()).unwrap_or("").to_string();
            Ok(ChatResponse {
                message: Message::new(MessageRole::Assistant, last),
                finish_reason: FinishReason::EndTurn,
                usage: Some(UsageMetadata::new(3, 2)),
                reasoning: None,
            })
        }

        fn model_id(&self) -> &str {
            &self.0
        }
    }

    #[tokio::test]
    async fn default_stream_replays_chat_as_one_delta_then_done() {
        use futures::StreamExt;

        let model = Echo("echo-1".into());
        let request = ChatRequest::new(vec![Message::human("hi")]);

        let mut stream = model.stream(request).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();

        match first {
            ChatStreamEvent::Delta(text) => assert_eq!(text, "hi"),
            ChatStreamEvent::Done(_) => panic!("expected a delta first"),
        }
        match second {
            ChatStreamEvent::Done(resp) => assert_eq!(resp.finish_reason, FinishReason::EndTurn),
            ChatStreamEvent::Delta(_) => panic!("expected the terminal event second"),
        }
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn usage_metadata_totals_input_and_output() {
        let usage = UsageMetadata::new(10, 5);
        assert_eq!(usage.accumulated.total_tokens, 15);
        assert_eq!(usage.reasoning_tokens, None);
    }

    #[test]
    fn reasoning_mode_separated_is_the_only_capturing_mode() {
        assert!(!ReasoningMode::Disabled.should_capture());
        assert!(!ReasoningMode::Default.should_capture());
        assert!(ReasoningMode::Separated.should_capture());
    }
}
