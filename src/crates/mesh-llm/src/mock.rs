//! A canned, deterministic [`Model`] with no network dependency — the
//! default stand-in for local development and the only adapter this
//! crate's own test suite exercises end to end.

use async_trait::async_trait;
use mesh_core::messages::{Message, MessageRole};

use crate::error::Result;
use crate::model::{ChatRequest, ChatResponse, FinishReason, Model, UsageMetadata};

/// Replies with a fixed response and a fixed token usage on every call.
#[derive(Debug, Clone)]
pub struct MockModel {
    model_id: String,
    reply: String,
    input_tokens_per_call: u64,
    output_tokens_per_call: u64,
}

impl MockModel {
    pub fn new(model_id: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            reply: reply.into(),
            input_tokens_per_call: 10,
            output_tokens_per_call: 5,
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens_per_call = input_tokens;
        self.output_tokens_per_call = output_tokens;
        self
    }
}

#[async_trait]
impl Model for MockModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse {
            message: Message::new(MessageRole::Assistant, self.reply.clone()),
            finish_reason: FinishReason::EndTurn,
            usage: Some(UsageMetadata::new(self.input_tokens_per_call, self.output_tokens_per_call)),
            reasoning: None,
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_with_the_configured_text_regardless_of_input() {
        let model = MockModel::new("mock-1", "hello there");
        let response = model.chat(ChatRequest::new(vec![Message::human("anything")])).await.unwrap();

        assert_eq!(response.message.text(), Some("hello there"));
        assert_eq!(response.finish_reason, FinishReason::EndTurn);
    }

    #[tokio::test]
    async fn usage_defaults_are_overridable() {
        let model = MockModel::new("mock-1", "hi").with_usage(100, 50);
        let response = model.chat(ChatRequest::new(vec![Message::human("x")])).await.unwrap();

        let usage = response.usage.unwrap();
        assert_eq!(usage.accumulated.input_tokens, 100);
        assert_eq!(usage.accumulated.output_tokens, 50);
    }

    #[tokio::test]
    async fn is_available_defaults_to_true() {
        let model = MockModel::new("mock-1", "hi");
        assert!(model.is_available().await.unwrap());
    }
}
