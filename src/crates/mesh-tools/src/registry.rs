//! `ToolRegistry`: the object-safe lookup an [`crate::tool::Tool`] collection
//! is exposed through.
//!
//! Kept as a trait rather than a concrete struct so an
//! [`Agent`](https://docs.rs/mesh-core) can hand back `Arc<dyn ToolRegistry>`
//! without mesh-core depending on a particular storage shape.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{Tool, ToolCall, ToolCallResult, ToolOutput};

#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn has(&self, name: &str) -> bool;

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>>;

    fn names(&self) -> Vec<String>;

    /// JSON Schema definitions for every registered tool, in the shape a
    /// model provider's function-calling API expects.
    fn schemas(&self) -> Vec<Value> {
        self.names()
            .into_iter()
            .filter_map(|name| self.get(&name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "input_schema": tool.input_schema(),
                })
            })
            .collect()
    }

    /// Resolves and invokes `call`, turning a missing tool, failed
    /// validation, or execution error into a [`ToolOutput::Error`] rather
    /// than propagating — a bad tool call becomes a message the model sees,
    /// not a run failure.
    async fn dispatch(&self, call: &ToolCall) -> ToolCallResult {
        let tool = match self.get(&call.name) {
            Some(tool) => tool,
            None => {
                return ToolCallResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: ToolOutput::Error {
                        error: format!(
                            "tool '{}' not found. Available tools: {}",
                            call.name,
                            self.names().join(", ")
                        ),
                    },
                };
            }
        };

        if let Err(e) = tool.validate_args(&call.args) {
            return ToolCallResult {
                id: call.id.clone(),
                name: call.name.clone(),
                output: ToolOutput::Error { error: e.to_string() },
            };
        }

        match tool.call(call.args.clone()).await {
            Ok(content) => ToolCallResult {
                id: call.id.clone(),
                name: call.name.clone(),
                output: ToolOutput::Success { content },
            },
            Err(e) => ToolCallResult {
                id: call.id.clone(),
                name: call.name.clone(),
                output: ToolOutput::Error { error: e.to_string() },
            },
        }
    }
}

/// A [`ToolRegistry`] backed by a plain `HashMap`.
#[derive(Default)]
pub struct InMemoryToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }
}

#[async_trait]
impl ToolRegistry for InMemoryToolRegistry {
    fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolOutput;

    struct Double;

    #[async_trait]
    impl Tool for Double {
        fn name(&self) -> &str {
            "double"
        }
        fn description(&self) -> &str {
            "doubles a number"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"x": {"type": "number"}}})
        }
        async fn call(&self, args: Value) -> crate::error::Result<Value> {
            let x = args["x"].as_i64().unwrap_or(0);
            Ok(serde_json::json!({"result": x * 2}))
        }
    }

    fn registry() -> InMemoryToolRegistry {
        InMemoryToolRegistry::new().with_tool(Arc::new(Double))
    }

    #[test]
    fn has_and_names_reflect_registration() {
        let reg = registry();
        assert!(reg.has("double"));
        assert!(!reg.has("nonexistent"));
        assert_eq!(reg.names(), vec!["double".to_string()]);
    }

    #[tokio::test]
    async fn dispatch_executes_registered_tool() {
        let reg = registry();
        let call = ToolCall { id: "call-1".into(), name: "double".into(), args: serde_json::json!({"x": 21}) };

        let result = reg.dispatch(&call).await;

        assert_eq!(result.id, "call-1");
        match result.output {
            ToolOutput::Success { content } => assert_eq!(content, serde_json::json!({"result": 42})),
            ToolOutput::Error { error } => panic!("expected success, got {error}"),
        }
    }

    #[tokio::test]
    async fn dispatch_reports_missing_tool_as_error_output() {
        let reg = registry();
        let call = ToolCall { id: "call-2".into(), name: "missing".into(), args: serde_json::json!({}) };

        let result = reg.dispatch(&call).await;

        match result.output {
            ToolOutput::Error { error } => assert!(error.contains("not found")),
            ToolOutput::Success { .. } => panic!("expected error for missing tool"),
        }
    }

    #[tokio::test]
    async fn dispatch_reports_invalid_args_without_calling_tool() {
        let reg = registry();
        let call = ToolCall { id: "call-3".into(), name: "double".into(), args: serde_json::json!(["not", "an", "object"]) };

        let result = reg.dispatch(&call).await;

        match result.output {
            ToolOutput::Error { error } => assert!(error.contains("object")),
            ToolOutput::Success { .. } => panic!("expected validation error"),
        }
    }

    #[test]
    fn schemas_lists_one_entry_per_tool() {
        let reg = registry();
        let schemas = reg.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["name"], "double");
    }
}
