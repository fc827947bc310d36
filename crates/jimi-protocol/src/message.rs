//! Conversation message types shared between the engine and the LLM contract.

use serde::Deserialize;
use serde::Serialize;

/// Role of a message within a [`Message`] sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a message's content. Assistant/user/system messages carry an
/// ordered sequence of these; tool messages carry a single text output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageReference { uri: String },
    StructuredBlob { mime_type: String, data: String },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text { text: s.into() }
    }

    /// Rough size estimate used for token accounting when the model hasn't
    /// reported authoritative usage: bytes/4 for text, a flat 100 for images,
    /// bytes/4 for structured blobs.
    pub fn estimated_tokens(&self) -> u64 {
        match self {
            ContentPart::Text { text } => (text.len() as u64) / 4,
            ContentPart::ImageReference { .. } => 100,
            ContentPart::StructuredBlob { data, .. } => (data.len() as u64) / 4,
        }
    }
}

/// A single tool-call request emitted by the assistant within one step.
///
/// Invariant: `id` is unique within its parent assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments as emitted by the model.
    pub arguments_json: String,
}

/// A durable, append-only conversation entry.
///
/// Invariant: every `Role::Tool` message's `tool_call_id` matches an earlier
/// assistant message's tool-call id within the same Context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fields neither this struct nor any provider adapter recognizes,
    /// preserved verbatim across a read-modify-write round trip rather than
    /// silently dropped.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
            tool_calls: None,
            tool_call_id: None,
            reasoning: None,
            name: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::text(text)],
            tool_calls: None,
            tool_call_id: None,
            reasoning: None,
            name: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn assistant_with_tool_calls(text: String, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: if text.is_empty() {
                Vec::new()
            } else {
                vec![ContentPart::text(text)]
            },
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            reasoning: None,
            name: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(text)],
            tool_calls: None,
            tool_call_id: None,
            reasoning: None,
            name: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentPart::text(output)],
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            reasoning: None,
            name: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Concatenated text of every [`ContentPart::Text`] part, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.content.iter().map(ContentPart::estimated_tokens).sum()
    }
}
