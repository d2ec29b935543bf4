//! Small, explicit extractors over untyped agent-event payloads.
//!
//! Incoming agent stream events are opaque JSON — the core does not know an
//! agent's wire format. Rather than deserializing into a broad "any" agent
//! event type, each extractor here has a single-responsibility contract:
//! look for one particular shape and return `None` if it isn't present.

use serde_json::Value;

/// A tool-use-start payload extracted from deep inside a
/// [`crate::event::MultiAgentEvent::NodeStream`] event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUseStart {
    pub tool_use_id: String,
    pub tool_name: String,
}

/// A token-usage snapshot extracted from a provider event. Carries whatever
/// subset of `{input, output}`/`{total}` the event actually reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsageSnapshot {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Probes `event` for a node id. Agent events and nested-orchestrator
/// events both sometimes carry one at the top level under different keys;
/// this checks the common ones in order.
pub fn extract_event_node_id(event: &Value) -> Option<String> {
    for key in ["nodeId", "node_id"] {
        if let Some(id) = event.get(key).and_then(Value::as_str) {
            return Some(id.to_string());
        }
    }
    None
}

/// Probes `event` for a tool-use-start shape. Recognizes the two common
/// encodings: a top-level `{type: "tool_use_start"|"toolUseStart", ...}` and
/// a nested `content_block_start` delta whose block has `type: "tool_use"`.
pub fn extract_tool_use_start(event: &Value) -> Option<ToolUseStart> {
    let type_tag = event.get("type").and_then(Value::as_str)?;

    match type_tag {
        "tool_use_start" | "toolUseStart" => {
            let tool_use_id = event
                .get("toolUseId")
                .or_else(|| event.get("tool_use_id"))
                .or_else(|| event.get("id"))
                .and_then(Value::as_str)?;
            let tool_name = event
                .get("toolName")
                .or_else(|| event.get("tool_name"))
                .or_else(|| event.get("name"))
                .and_then(Value::as_str)?;
            Some(ToolUseStart {
                tool_use_id: tool_use_id.to_string(),
                tool_name: tool_name.to_string(),
            })
        }
        "content_block_start" => {
            let block = event.get("content_block").or_else(|| event.get("contentBlock"))?;
            if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                return None;
            }
            let tool_use_id = block.get("id").and_then(Value::as_str)?;
            let tool_name = block.get("name").and_then(Value::as_str)?;
            Some(ToolUseStart {
                tool_use_id: tool_use_id.to_string(),
                tool_name: tool_name.to_string(),
            })
        }
        _ => None,
    }
}

/// Probes `event` for a token-usage snapshot, accepting either a
/// `{inputTokens, outputTokens}` shape or a `{input_tokens, output_tokens,
/// total_tokens}` shape nested under `usage`.
pub fn extract_token_usage_snapshot(event: &Value) -> Option<TokenUsageSnapshot> {
    let usage = event.get("usage").unwrap_or(event);

    let input_tokens = usage
        .get("inputTokens")
        .or_else(|| usage.get("input_tokens"))
        .and_then(Value::as_u64);
    let output_tokens = usage
        .get("outputTokens")
        .or_else(|| usage.get("output_tokens"))
        .and_then(Value::as_u64);
    let total_tokens = usage
        .get("totalTokens")
        .or_else(|| usage.get("total_tokens"))
        .and_then(Value::as_u64);

    if input_tokens.is_none() && output_tokens.is_none() && total_tokens.is_none() {
        return None;
    }

    Some(TokenUsageSnapshot { input_tokens, output_tokens, total_tokens })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_tool_use_start_from_top_level_shape() {
        let event = json!({"type": "tool_use_start", "toolUseId": "tu_1", "toolName": "handoff_to_agent"});
        let extracted = extract_tool_use_start(&event).unwrap();
        assert_eq!(extracted.tool_use_id, "tu_1");
        assert_eq!(extracted.tool_name, "handoff_to_agent");
    }

    #[test]
    fn extracts_tool_use_start_from_content_block_delta() {
        let event = json!({
            "type": "content_block_start",
            "content_block": {"type": "tool_use", "id": "tu_2", "name": "search"}
        });
        let extracted = extract_tool_use_start(&event).unwrap();
        assert_eq!(extracted.tool_use_id, "tu_2");
        assert_eq!(extracted.tool_name, "search");
    }

    #[test]
    fn returns_none_for_unrelated_event() {
        let event = json!({"type": "content_block_delta", "delta": {"text": "hi"}});
        assert!(extract_tool_use_start(&event).is_none());
        assert!(extract_token_usage_snapshot(&event).is_none());
    }

    #[test]
    fn extracts_nested_usage_snapshot() {
        let event = json!({"type": "message_delta", "usage": {"input_tokens": 60, "output_tokens": 60}});
        let snapshot = extract_token_usage_snapshot(&event).unwrap();
        assert_eq!(snapshot.input_tokens, Some(60));
        assert_eq!(snapshot.output_tokens, Some(60));
    }
}
