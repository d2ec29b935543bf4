//! The `Tool` capability a registry dispatches to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A single callable tool an agent can expose to its model.
///
/// Mirrors the shape a model provider expects for function calling: a
/// name, a natural-language description, and a JSON Schema for arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    /// Basic shape check before dispatch: arguments must be a JSON object.
    /// Individual tools may layer stricter validation on top.
    fn validate_args(&self, args: &Value) -> Result<()> {
        if !args.is_object() {
            return Err(crate::error::ToolError::InvalidArguments {
                tool: self.name().to_string(),
                error: "arguments must be a JSON object".to_string(),
            });
        }
        Ok(())
    }

    async fn call(&self, args: Value) -> Result<Value>;
}

/// A request to invoke a tool, as carried on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The outcome of dispatching a [`ToolCall`] through a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutput {
    Success { content: Value },
    Error { error: String },
}

/// A [`ToolCall`] paired with its [`ToolOutput`], ready to render back into
/// the conversation as a tool-role message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    pub output: ToolOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its arguments back"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn call(&self, args: Value) -> Result<Value> {
            Ok(args)
        }
    }

    #[test]
    fn validate_args_rejects_non_object() {
        let err = Echo.validate_args(&serde_json::json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, crate::error::ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn call_returns_tool_output() {
        let result = Echo.call(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }
}
