//! Concrete [`Agent`] binding a resolved [`Model`] and [`ToolRegistry`] to
//! the orchestration core's opaque agent contract.
//!
//! `mesh-core` never depends on `mesh-llm` — this is the seam `mesh-server`
//! owns: turn an [`AgentSpec`](mesh_events::AgentSpec) into something that
//! can actually talk to a provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use mesh_core::agent::{Agent, AgentResult, AgentSnapshot, StopReason};
use mesh_core::error::{OrchestratorError, Result as CoreResult};
use mesh_core::messages::Message;
use mesh_events::TokenAccumulator;
use mesh_llm::model::{ChatRequest, ChatStreamEvent, FinishReason, Model, ToolDefinition};
use mesh_tools::{Tool, ToolCall as ToolRegistryCall, ToolRegistry};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::TokenCounter;

/// How many model-turn/tool-turn round trips a single [`LlmAgent::stream`]
/// call may take before it gives up and returns with `StopReason::MaxTokens`
/// — a runaway tool-calling loop is a node-level concern, not a budget one.
const MAX_TOOL_ITERATIONS: u32 = 16;

pub struct LlmAgent {
    name: String,
    model: Arc<dyn Model>,
    tools: Arc<dyn ToolRegistry>,
    /// Presented to the model alongside `tools` but never dispatched through
    /// the registry — a swarm member's coordination tool (`handoff_to_agent`).
    /// Its call is surfaced as result content instead; see `mesh-core`'s
    /// swarm turn loop.
    coordination_tool: Option<Arc<dyn Tool>>,
    state: Mutex<AgentSnapshot>,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn Model>, tools: Arc<dyn ToolRegistry>, system_prompt: &str) -> Self {
        let snapshot = AgentSnapshot { messages: vec![Message::system(system_prompt)], scratch_state: Value::Null };
        Self { name: name.into(), model, tools, coordination_tool: None, state: Mutex::new(snapshot) }
    }

    pub fn with_coordination_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.coordination_tool = Some(tool);
        self
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let registry_defs = self
            .tools
            .names()
            .into_iter()
            .filter_map(|name| self.tools.get(&name))
            .map(|tool: Arc<dyn Tool>| ToolDefinition::new(tool.name(), tool.description()).with_parameters(tool.input_schema()));
        let coordination_def = self
            .coordination_tool
            .iter()
            .map(|tool| ToolDefinition::new(tool.name(), tool.description()).with_parameters(tool.input_schema()));
        registry_defs.chain(coordination_def).collect()
    }

    fn node_execution_error(&self, err: impl std::fmt::Display) -> OrchestratorError {
        OrchestratorError::NodeExecution { node: self.name.clone(), source: err.to_string() }
    }

    /// Fallback usage accounting for a provider that never reports it on a
    /// turn — character-based estimation rather than leaving the budget
    /// blind to a turn it genuinely spent tokens on.
    fn estimate_usage(&self, prompt_messages: &[Message], reply: &Message) -> TokenAccumulator {
        let counter = TokenCounter::new(self.model.model_id());
        let input_tokens: u64 = prompt_messages
            .iter()
            .filter_map(|m| m.text())
            .map(|text| counter.count_text(text).tokens as u64)
            .sum();
        let output_tokens = reply.text().map(|text| counter.count_text(text).tokens as u64).unwrap_or(0);
        TokenAccumulator { input_tokens, output_tokens, total_tokens: input_tokens + output_tokens }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Arc<dyn ToolRegistry> {
        self.tools.clone()
    }

    async fn stream(&self, input: Value, tx: mpsc::Sender<Value>) -> CoreResult<AgentResult> {
        let mut messages = {
            let guard = self.state.lock().expect("agent state poisoned");
            guard.messages.clone()
        };

        let input_text = input.get("text").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| input.to_string());
        messages.push(Message::human(input_text));

        let mut accumulated = TokenAccumulator::default();
        let tool_defs = self.tool_definitions();

        for _ in 0..MAX_TOOL_ITERATIONS {
            let request = ChatRequest::new(messages.clone()).with_tools(tool_defs.clone());
            let mut stream = self.model.stream(request).await.map_err(|e| self.node_execution_error(e))?;

            let mut done = None;
            while let Some(item) = stream.next().await {
                match item.map_err(|e| self.node_execution_error(e))? {
                    ChatStreamEvent::Delta(text) => {
                        let _ = tx.send(serde_json::json!({"type": "text_delta", "text": text})).await;
                    }
                    ChatStreamEvent::Done(response) => done = Some(*response),
                }
            }

            let Some(response) = done else {
                let mut snapshot = self.state.lock().expect("agent state poisoned");
                snapshot.messages = messages;
                return Ok(AgentResult {
                    stop_reason: StopReason::StreamIncomplete,
                    content: None,
                    accumulated_usage: accumulated,
                    interrupts: Vec::new(),
                });
            };

            let turn_usage = match response.usage {
                Some(usage) => usage.accumulated,
                None => self.estimate_usage(&messages, &response.message),
            };
            let _ = tx
                .send(serde_json::json!({
                    "type": "usage",
                    "usage": {
                        "inputTokens": turn_usage.input_tokens,
                        "outputTokens": turn_usage.output_tokens,
                        "totalTokens": turn_usage.total_tokens,
                    }
                }))
                .await;
            accumulated.input_tokens += turn_usage.input_tokens;
            accumulated.output_tokens += turn_usage.output_tokens;
            accumulated.total_tokens += turn_usage.total_tokens;

            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message.clone());

            match response.finish_reason {
                FinishReason::EndTurn => {
                    let content = response.message.text().map(|t| Value::String(t.to_string()));
                    let mut snapshot = self.state.lock().expect("agent state poisoned");
                    snapshot.messages = messages;
                    return Ok(AgentResult { stop_reason: StopReason::EndTurn, content, accumulated_usage: accumulated, interrupts: Vec::new() });
                }
                FinishReason::MaxTokens => {
                    let content = response.message.text().map(|t| Value::String(t.to_string()));
                    let mut snapshot = self.state.lock().expect("agent state poisoned");
                    snapshot.messages = messages;
                    return Ok(AgentResult { stop_reason: StopReason::MaxTokens, content, accumulated_usage: accumulated, interrupts: Vec::new() });
                }
                FinishReason::ToolUse => {
                    for call in tool_calls.unwrap_or_default() {
                        let _ = tx
                            .send(serde_json::json!({"type": "tool_use_start", "toolUseId": call.id, "toolName": call.name}))
                            .await;

                        let is_coordination_call =
                            self.coordination_tool.as_ref().is_some_and(|tool| tool.name() == call.name);
                        if is_coordination_call {
                            let mut snapshot = self.state.lock().expect("agent state poisoned");
                            snapshot.messages = messages;
                            return Ok(AgentResult {
                                stop_reason: StopReason::EndTurn,
                                content: Some(serde_json::json!({"handoff_to_agent": call.args})),
                                accumulated_usage: accumulated,
                                interrupts: Vec::new(),
                            });
                        }

                        let registry_call = ToolRegistryCall { id: call.id.clone(), name: call.name.clone(), args: call.args.clone() };
                        let result = self.tools.dispatch(&registry_call).await;
                        let content = serde_json::to_value(&result.output).unwrap_or(Value::Null);
                        messages.push(Message::tool(content.to_string(), call.id));
                    }
                }
            }
        }

        let mut snapshot = self.state.lock().expect("agent state poisoned");
        snapshot.messages = messages;
        Ok(AgentResult { stop_reason: StopReason::MaxTokens, content: None, accumulated_usage: accumulated, interrupts: Vec::new() })
    }

    fn snapshot(&self) -> AgentSnapshot {
        self.state.lock().expect("agent state poisoned").clone()
    }

    async fn restore(&self, snapshot: AgentSnapshot) {
        *self.state.lock().expect("agent state poisoned") = snapshot;
    }
}
