//! The `handoff_to_agent` coordination tool every swarm member is given.
//!
//! This tool is special: its call is never actually dispatched through a
//! [`ToolRegistry`](crate::registry::ToolRegistry). The orchestrator reads
//! the tool-call arguments straight off the assistant's turn and turns them
//! into a handoff request itself, so the tool body never closes over swarm
//! state (the closure-avoidance design this shape exists for). What lives
//! here is just the definition presented to the model — name, description,
//! argument schema — shared by every caller that needs to build a swarm
//! member's tool list.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::tool::Tool;

/// Name every swarm orchestrator reserves for the coordination tool; a node
/// whose own registry already defines a tool by this name fails swarm
/// construction (tool-name collision).
pub const HANDOFF_TOOL_NAME: &str = "handoff_to_agent";

/// Definition of the coordination tool, for inclusion in a swarm member's
/// presented tool list.
pub struct HandoffTool;

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        HANDOFF_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Hand off the conversation to another agent in this swarm. Use this when the \
         current task is better handled by a different agent, or when your part of the \
         work is done and another agent should continue."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["target_agent"],
            "properties": {
                "target_agent": {
                    "type": "string",
                    "description": "Name of the agent to hand off to. Must be another member of this swarm.",
                },
                "message": {
                    "type": "string",
                    "description": "Optional note for the next agent explaining why control is being handed off.",
                },
                "context": {
                    "type": "object",
                    "description": "Optional key/value context to merge into the swarm's shared context.",
                },
            },
        })
    }

    /// Never reached in a correctly wired swarm — the orchestrator
    /// intercepts this tool's calls before they reach a registry. Present
    /// for completeness and for direct unit testing of the schema/name.
    async fn call(&self, args: Value) -> Result<Value> {
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_target_agent() {
        let schema = HandoffTool.input_schema();
        assert_eq!(schema["required"], serde_json::json!(["target_agent"]));
    }

    #[test]
    fn name_matches_the_reserved_constant() {
        assert_eq!(HandoffTool.name(), HANDOFF_TOOL_NAME);
    }
}
