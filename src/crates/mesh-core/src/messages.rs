//! Message types for agent conversation history, used indirectly via
//! [`crate::agent::AgentSnapshot`].
//!
//! The `Message`/`MessageLike` model and the `add_messages`/`trim_messages`
//! reducers a node's snapshot and an agent's internal history both build on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single tool invocation requested by an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Role of the message sender in a conversation. Serializes to lowercase
/// strings compatible with common LLM provider APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
    Tool,
    Custom(String),
}

/// One part of a multimodal message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },
    Image {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<Value>,
    },
    Custom {
        data: Value,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into(), cache_control: None }
    }

    pub fn text_with_cache(text: impl Into<String>, cache_control: Value) -> Self {
        Self::Text { text: text.into(), cache_control: Some(cache_control) }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self::Image { url: Some(url.into()), source: None }
    }

    pub fn image_data(media_type: &str, data: &str) -> Self {
        Self::Image {
            url: None,
            source: Some(serde_json::json!({ "type": "base64", "media_type": media_type, "data": data })),
        }
    }
}

/// Message content: either plain text, or structured multimodal parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// A single message in an agent's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_role")]
    pub role: MessageRole,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

fn default_role() -> MessageRole {
    MessageRole::Human
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self { id: Some(Uuid::new_v4().to_string()), role, content: content.into(), ..Default::default() }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn ai(content: impl Into<MessageContent>) -> Self {
        Self::assistant(content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::human(content)
    }

    pub fn tool(content: impl Into<MessageContent>, tool_call_id: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(s) => Some(s),
            MessageContent::Parts(_) => None,
        }
    }

    pub fn ensure_id(&mut self) {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
    }
}

/// Marker for removing a message by id from a merged history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveMessage {
    pub id: String,
}

impl RemoveMessage {
    pub const REMOVE_ALL: &'static str = "__remove_all__";

    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn remove_all() -> Self {
        Self { id: Self::REMOVE_ALL.to_string() }
    }
}

/// A message, a removal marker, or a `(role, content)` shorthand — the
/// input accepted by [`add_message_likes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageLike {
    Message(Message),
    Remove(RemoveMessage),
    Tuple((String, String)),
}

impl From<Message> for MessageLike {
    fn from(m: Message) -> Self {
        Self::Message(m)
    }
}

impl From<RemoveMessage> for MessageLike {
    fn from(r: RemoveMessage) -> Self {
        Self::Remove(r)
    }
}

impl From<(String, String)> for MessageLike {
    fn from((role, content): (String, String)) -> Self {
        Self::Tuple((role, content))
    }
}

impl From<(&str, &str)> for MessageLike {
    fn from((role, content): (&str, &str)) -> Self {
        Self::Tuple((role.to_string(), content.to_string()))
    }
}

fn role_from_str(role: &str) -> MessageRole {
    match role {
        "system" => MessageRole::System,
        "human" | "user" => MessageRole::Human,
        "assistant" | "ai" => MessageRole::Assistant,
        "tool" => MessageRole::Tool,
        custom => MessageRole::Custom(custom.to_string()),
    }
}

pub fn convert_to_messages(values: Vec<MessageLike>) -> Vec<Message> {
    values
        .into_iter()
        .filter_map(|v| match v {
            MessageLike::Message(m) => Some(m),
            MessageLike::Remove(_) => None,
            MessageLike::Tuple((role, content)) => Some(Message::new(role_from_str(&role), content)),
        })
        .collect()
}

pub fn filter_by_role(messages: &[Message], role: MessageRole) -> Vec<Message> {
    messages.iter().filter(|m| m.role == role).cloned().collect()
}

pub fn get_last_message(messages: &[Message]) -> Option<&Message> {
    messages.last()
}

pub fn get_messages_by_id(messages: &[Message], ids: &[&str]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| m.id.as_ref().map(|id| ids.contains(&id.as_str())).unwrap_or(false))
        .cloned()
        .collect()
}

/// Combines adjacent messages from the same role into one.
pub fn merge_consecutive_messages(messages: Vec<Message>) -> Vec<Message> {
    if messages.is_empty() {
        return messages;
    }
    let mut result = Vec::new();
    let mut current = messages[0].clone();
    for message in messages.into_iter().skip(1) {
        if message.role == current.role {
            if let (MessageContent::Text(curr), MessageContent::Text(next)) = (&current.content, &message.content) {
                current.content = MessageContent::Text(format!("{curr}\n{next}"));
            }
        } else {
            result.push(current);
            current = message;
        }
    }
    result.push(current);
    result
}

pub fn truncate_messages(messages: Vec<Message>, max_count: usize) -> Vec<Message> {
    if messages.len() <= max_count {
        messages
    } else {
        let skip_count = messages.len() - max_count;
        messages.into_iter().skip(skip_count).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TrimOptions {
    pub max_messages: usize,
    pub strategy: TrimStrategy,
    pub include_system: bool,
    pub start_on_human: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimStrategy {
    First,
    Last,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self { max_messages: 10, strategy: TrimStrategy::Last, include_system: true, start_on_human: true }
    }
}

impl TrimOptions {
    pub fn last(max_messages: usize) -> Self {
        Self { max_messages, strategy: TrimStrategy::Last, ..Default::default() }
    }

    pub fn first(max_messages: usize) -> Self {
        Self { max_messages, strategy: TrimStrategy::First, ..Default::default() }
    }

    pub fn with_include_system(mut self, include: bool) -> Self {
        self.include_system = include;
        self
    }

    pub fn with_start_on_human(mut self, start_on_human: bool) -> Self {
        self.start_on_human = start_on_human;
        self
    }
}

/// Trims to the last/first `max_messages`, optionally preserving a leading
/// system message and skipping ahead to the first human message.
pub fn trim_messages(messages: Vec<Message>, options: TrimOptions) -> Vec<Message> {
    if messages.is_empty() {
        return messages;
    }

    let mut result = Vec::new();
    let mut working_messages = messages;

    let system_message = if options.include_system
        && !working_messages.is_empty()
        && working_messages[0].role == MessageRole::System
    {
        Some(working_messages.remove(0))
    } else {
        None
    };

    let trimmed = match options.strategy {
        TrimStrategy::Last => {
            if working_messages.len() > options.max_messages {
                let skip_count = working_messages.len() - options.max_messages;
                working_messages.into_iter().skip(skip_count).collect()
            } else {
                working_messages
            }
        }
        TrimStrategy::First => working_messages.into_iter().take(options.max_messages).collect(),
    };

    if let Some(sys_msg) = system_message {
        result.push(sys_msg);
    }
    result.extend(trimmed);

    if options.start_on_human {
        let system_count = if result.first().map(|m| &m.role) == Some(&MessageRole::System) { 1 } else { 0 };
        let first_human_idx = result[system_count..]
            .iter()
            .position(|m| m.role == MessageRole::Human)
            .map(|idx| idx + system_count);

        if let Some(idx) = first_human_idx {
            if system_count > 0 {
                let system = result[0].clone();
                result = result.into_iter().skip(idx).collect();
                result.insert(0, system);
            } else {
                result = result.into_iter().skip(idx).collect();
            }
        }
    }

    result
}

/// Intelligently merges two message lists by id: replaces existing ids,
/// deletes via [`RemoveMessage`], appends the rest. A leading
/// `RemoveMessage::remove_all()` in `right` discards all of `left`.
pub fn add_messages(left: Vec<Message>, right: Vec<Message>) -> Vec<Message> {
    add_message_likes(
        left.into_iter().map(MessageLike::Message).collect(),
        right.into_iter().map(MessageLike::Message).collect(),
    )
}

/// The general form of [`add_messages`] accepting [`MessageLike`] operations.
///
/// Panics if a [`RemoveMessage`] names an id not present in the merged set —
/// callers should only ever remove ids they know came from `left`.
pub fn add_message_likes(left: Vec<MessageLike>, right: Vec<MessageLike>) -> Vec<Message> {
    let remove_all_idx = right.iter().position(|ml| match ml {
        MessageLike::Remove(rm) => rm.id == RemoveMessage::REMOVE_ALL,
        MessageLike::Message(m) => m.id.as_deref() == Some(RemoveMessage::REMOVE_ALL),
        _ => false,
    });

    if let Some(idx) = remove_all_idx {
        return right
            .into_iter()
            .skip(idx + 1)
            .filter_map(|ml| match ml {
                MessageLike::Message(mut m) => {
                    m.ensure_id();
                    Some(m)
                }
                MessageLike::Remove(_) => None,
                MessageLike::Tuple((role, content)) => Some(Message::new(role_from_str(&role), content)),
            })
            .collect();
    }

    let mut merged: Vec<Message> = left
        .into_iter()
        .filter_map(|ml| match ml {
            MessageLike::Message(mut m) => {
                m.ensure_id();
                Some(m)
            }
            MessageLike::Remove(_) => None,
            MessageLike::Tuple((role, content)) => {
                let mut m = Message::new(role_from_str(&role), content);
                m.ensure_id();
                Some(m)
            }
        })
        .collect();

    let mut merged_by_id: HashMap<String, usize> =
        merged.iter().enumerate().filter_map(|(i, m)| m.id.clone().map(|id| (id, i))).collect();
    let mut ids_to_remove = std::collections::HashSet::new();

    for ml in right {
        match ml {
            MessageLike::Message(mut m) => {
                m.ensure_id();
                let id = m.id.clone().unwrap();
                if let Some(&existing_idx) = merged_by_id.get(&id) {
                    ids_to_remove.remove(&id);
                    merged[existing_idx] = m;
                } else {
                    merged_by_id.insert(id.clone(), merged.len());
                    merged.push(m);
                }
            }
            MessageLike::Remove(rm) => {
                if merged_by_id.contains_key(&rm.id) {
                    ids_to_remove.insert(rm.id.clone());
                } else {
                    panic!("attempting to delete a message with an id that doesn't exist ('{}')", rm.id);
                }
            }
            MessageLike::Tuple((role, content)) => {
                let mut m = Message::new(role_from_str(&role), content);
                m.ensure_id();
                let id = m.id.clone().unwrap();
                if let Some(&existing_idx) = merged_by_id.get(&id) {
                    ids_to_remove.remove(&id);
                    merged[existing_idx] = m;
                } else {
                    merged_by_id.insert(id.clone(), merged.len());
                    merged.push(m);
                }
            }
        }
    }

    merged.into_iter().filter(|m| !m.id.as_ref().map(|id| ids_to_remove.contains(id)).unwrap_or(false)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_creation() {
        let msg = Message::human("Hello world");
        assert_eq!(msg.role, MessageRole::Human);
        assert_eq!(msg.text(), Some("Hello world"));
        assert!(msg.id.is_some());
    }

    #[test]
    fn ai_and_user_are_aliases() {
        assert_eq!(Message::ai("x").role, Message::assistant("x").role);
        assert_eq!(Message::user("x").role, Message::human("x").role);
    }

    #[test]
    fn tool_message_carries_call_id() {
        let msg = Message::tool("Result", "call_123");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
    }

    #[test]
    fn add_messages_replaces_by_id() {
        let msgs1 = vec![Message::human("Original").with_id("1")];
        let msgs2 = vec![Message::human("Updated").with_id("1")];
        let result = add_messages(msgs1, msgs2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text(), Some("Updated"));
    }

    #[test]
    fn add_messages_remove_all_discards_left() {
        let msgs1 = vec![Message::human("First").with_id("1"), Message::human("Second").with_id("2")];
        let mut remove_all = Message::human("placeholder");
        remove_all.id = Some(RemoveMessage::REMOVE_ALL.to_string());
        let msgs2 = vec![remove_all, Message::human("New").with_id("3")];
        let result = add_messages(msgs1, msgs2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, Some("3".to_string()));
    }

    #[test]
    fn add_message_likes_remove_then_replace_keeps_replacement() {
        let msgs1 = vec![Message::human("First").with_id("1"), Message::human("Second").with_id("2")];
        let msgs2 =
            vec![MessageLike::Remove(RemoveMessage::new("2")), MessageLike::Message(Message::human("New Second").with_id("2"))];
        let result = add_message_likes(msgs1.into_iter().map(MessageLike::Message).collect(), msgs2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].text(), Some("New Second"));
    }

    #[test]
    #[should_panic(expected = "attempting to delete")]
    fn add_message_likes_remove_nonexistent_panics() {
        let msgs1 = vec![MessageLike::Message(Message::human("First").with_id("1"))];
        let msgs2 = vec![MessageLike::Remove(RemoveMessage::new("999"))];
        add_message_likes(msgs1, msgs2);
    }

    #[test]
    fn trim_messages_preserves_system_and_starts_on_human() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::assistant("Let me help"),
            Message::human("Hello"),
            Message::assistant("Hi!"),
        ];
        let trimmed = trim_messages(messages, TrimOptions::last(10));
        assert_eq!(trimmed.len(), 3);
        assert_eq!(trimmed[0].role, MessageRole::System);
        assert_eq!(trimmed[1].role, MessageRole::Human);
    }

    #[test]
    fn merge_consecutive_messages_combines_same_role() {
        let messages =
            vec![Message::human("Hello"), Message::human("How are you?"), Message::assistant("I'm good!")];
        let merged = merge_consecutive_messages(messages);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text(), Some("Hello\nHow are you?"));
    }
}
