//! The unified chat-request/response shape that sits between client dialects
//! and provider wire formats.
//!
//! This is an OpenAI-shaped superset: every dialect
//! transformer's job is to get a request into this shape (`transform_request_out`)
//! and a response out of it (`transform_response_in`). Provider-bound
//! transformers only ever see this shape too, never a raw client body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical request shape the whole pipeline operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedRequest {
    /// `"model"` or `"provider,model"` — rewritten by the router/dispatcher
    /// before the pipeline runs; by the time a transformer sees it, any
    /// comma has already been stripped.
    pub model: String,
    pub messages: Vec<UnifiedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<UnifiedTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<UnifiedToolChoice>,
    /// Truthy on reasoning-capable requests; consulted by the router's
    /// `Router.think` rule. Carried as an opaque value because its shape is
    /// provider-specific and the router only ever checks truthiness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
}

impl UnifiedRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnifiedRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMessage {
    pub role: UnifiedRole,
    /// `null` is represented as `Blocks(vec![])` on the way in and omitted
    /// entirely (via `skip_serializing_if`) on the way out when a message
    /// carries only tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<UnifiedContentContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<UnifiedToolCall>>,
    /// Present iff `role == Tool`; references the `ToolCall.id` this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Opaque per-provider cache hint (Anthropic prompt caching). Propagated
    /// unchanged unless a transformer strips it (see `openrouter`/`groq`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<Value>,
    /// Reasoning trace, when the backend or a utility transformer surfaced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<UnifiedThinking>,
}

impl UnifiedMessage {
    pub fn text(role: UnifiedRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(UnifiedContentContainer::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
            cache_control: None,
            thinking: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedThinking {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnifiedContentContainer {
    Text(String),
    Blocks(Vec<UnifiedContent>),
}

impl UnifiedContentContainer {
    /// Collapse to a single text string the way the Anthropic dialect does
    /// when aggregating an assistant message's text parts.
    pub fn as_joined_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(UnifiedContent::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UnifiedContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { url: String, detail: Option<String> },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: UnifiedToolResultContent,
    },
}

impl UnifiedContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnifiedToolResultContent {
    Text(String),
    Json(Value),
}

impl UnifiedToolResultContent {
    /// Stringify the result the way the Anthropic `transform_request_out`
    /// does when it collapses a `tool_result` block into a `role:"tool"`
    /// unified message.
    pub fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedTool {
    #[serde(rename = "type")]
    pub kind: ToolType,
    pub function: UnifiedFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnifiedToolChoice {
    Mode(UnifiedToolChoiceMode),
    Specific { function: UnifiedFunctionChoice },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedToolChoiceMode {
    None,
    Auto,
    #[serde(alias = "any")]
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedFunctionChoice {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToolType,
    pub function: UnifiedFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedFunctionCall {
    pub name: String,
    pub arguments: String,
}
