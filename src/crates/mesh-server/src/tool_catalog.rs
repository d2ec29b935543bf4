//! Built-in tool catalog an agent spec's `tools: Vec<String>` names are
//! resolved against.
//!
//! The orchestration core treats a [`Tool`] as an opaque callable; this
//! module is where the runtime decides which concrete callables actually
//! exist and wires a run request's tool-name list into a registry for each
//! resolved agent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mesh_tools::{InMemoryToolRegistry, Tool, ToolRegistry};
use serde_json::Value;

/// Returns the current UTC time. Useful for agents that need to reason
/// about dates without the model hallucinating one.
struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Returns the current UTC date and time in RFC 3339 format."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Value) -> mesh_tools::Result<Value> {
        Ok(serde_json::json!({"utc": Utc::now().to_rfc3339()}))
    }
}

/// Evaluates a small arithmetic expression of the form `"<number> <op>
/// <number>"` where `op` is one of `+ - * /`. A stand-in for a real
/// calculator/code-execution tool, exercising the tool-dispatch path with
/// validated input.
struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluates a simple arithmetic expression: '<number> <+|-|*|/> <number>'."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["expression"],
            "properties": {"expression": {"type": "string"}},
        })
    }

    fn validate_args(&self, args: &Value) -> mesh_tools::Result<()> {
        if !args.get("expression").is_some_and(Value::is_string) {
            return Err(mesh_tools::ToolError::InvalidArguments {
                tool: self.name().to_string(),
                error: "'expression' must be a string".to_string(),
            });
        }
        Ok(())
    }

    async fn call(&self, args: Value) -> mesh_tools::Result<Value> {
        let expression = args["expression"].as_str().unwrap_or_default();
        let parts: Vec<&str> = expression.split_whitespace().collect();
        let invalid = || mesh_tools::ToolError::ExecutionFailed {
            tool: self.name().to_string(),
            error: format!("cannot evaluate '{expression}'"),
        };
        let [lhs, op, rhs] = parts[..] else { return Err(invalid()) };
        let lhs: f64 = lhs.parse().map_err(|_| invalid())?;
        let rhs: f64 = rhs.parse().map_err(|_| invalid())?;
        let result = match op {
            "+" => lhs + rhs,
            "-" => lhs - rhs,
            "*" => lhs * rhs,
            "/" if rhs != 0.0 => lhs / rhs,
            _ => return Err(invalid()),
        };
        Ok(serde_json::json!({"result": result}))
    }
}

fn builtin_tools() -> HashMap<&'static str, Arc<dyn Tool>> {
    let mut tools: HashMap<&'static str, Arc<dyn Tool>> = HashMap::new();
    tools.insert("current_time", Arc::new(CurrentTimeTool));
    tools.insert("calculator", Arc::new(CalculatorTool));
    tools
}

/// Resolves a run request's `tools: Vec<String>` against the built-in
/// catalog. Unknown names are dropped rather than failing the run — the
/// tool-policy layer already strips blocked tools the same way, so an
/// unrecognized name degrades to "agent has one fewer tool" instead of a
/// hard validation failure.
pub fn build_registry(names: &[String]) -> Arc<dyn ToolRegistry> {
    let catalog = builtin_tools();
    let mut registry = InMemoryToolRegistry::new();
    for name in names {
        if let Some(tool) = catalog.get(name.as_str()) {
            registry.register(tool.clone());
        } else {
            tracing::warn!(tool = %name, "unknown tool name in agent spec, skipping");
        }
    }
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_time_returns_an_rfc3339_string() {
        let result = CurrentTimeTool.call(serde_json::json!({})).await.unwrap();
        assert!(result["utc"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn calculator_evaluates_simple_expressions() {
        let result = CalculatorTool.call(serde_json::json!({"expression": "2 + 3"})).await.unwrap();
        assert_eq!(result["result"], serde_json::json!(5.0));
    }

    #[tokio::test]
    async fn calculator_rejects_division_by_zero() {
        let err = CalculatorTool.call(serde_json::json!({"expression": "1 / 0"})).await.unwrap_err();
        assert!(matches!(err, mesh_tools::ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn build_registry_skips_unknown_names() {
        let registry = build_registry(&["calculator".to_string(), "does_not_exist".to_string()]);
        assert!(registry.has("calculator"));
        assert!(!registry.has("does_not_exist"));
    }
}
