//! The Anthropic Messages dialect.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{GatewayError, Result};
use crate::transform::{ClientResponse, RawResponse, ResponseBody, TransformConfig, Transformer};
use crate::unified::{
    ToolType, UnifiedContent, UnifiedContentContainer, UnifiedFunction, UnifiedFunctionCall, UnifiedFunctionChoice,
    UnifiedMessage, UnifiedRequest, UnifiedRole, UnifiedTool, UnifiedToolCall, UnifiedToolChoice,
    UnifiedToolChoiceMode, UnifiedToolResultContent,
};

use super::anthropic_sse;

#[derive(Debug, Default)]
pub struct Anthropic;

#[async_trait]
impl Transformer for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn end_point(&self) -> Option<&str> {
        Some("/v1/messages")
    }

    fn transform_request_out(&self, body: Value) -> Result<(UnifiedRequest, TransformConfig)> {
        let unified = request_from_anthropic(&body)?;
        Ok((unified, TransformConfig::default()))
    }

    async fn transform_response_in(&self, response: RawResponse) -> Result<ClientResponse> {
        match response.body {
            ResponseBody::Buffered(value) => {
                let body = response_to_anthropic(&value);
                Ok(ClientResponse::json(response.status, body))
            }
            ResponseBody::Stream(stream) => anthropic_sse::encode(response.status, response.headers, stream),
        }
    }
}

fn request_from_anthropic(body: &Value) -> Result<UnifiedRequest> {
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidRequest("missing 'model'".to_string()))?
        .to_string();

    let mut messages = Vec::new();

    if let Some(system) = body.get("system") {
        if let Some(message) = system_message(system) {
            messages.push(message);
        }
    }

    if let Some(raw_messages) = body.get("messages").and_then(Value::as_array) {
        for raw in raw_messages {
            messages.extend(convert_message(raw)?);
        }
    }

    let tools = body
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| tools.iter().map(convert_tool).collect());

    let tool_choice = body.get("tool_choice").and_then(convert_tool_choice);

    Ok(UnifiedRequest {
        model,
        messages,
        max_tokens: body.get("max_tokens").and_then(Value::as_u64).map(|n| n as u32),
        temperature: body.get("temperature").and_then(Value::as_f64).map(|n| n as f32),
        stream: body.get("stream").and_then(Value::as_bool),
        tools,
        tool_choice,
        thinking: body.get("thinking").cloned(),
    })
}

fn system_message(system: &Value) -> Option<UnifiedMessage> {
    match system {
        Value::String(text) => Some(UnifiedMessage::text(UnifiedRole::System, text.clone())),
        Value::Array(parts) => {
            let blocks: Vec<UnifiedContent> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(|text| UnifiedContent::Text { text: text.to_string() })
                .collect();
            if blocks.is_empty() {
                return None;
            }
            Some(UnifiedMessage {
                role: UnifiedRole::System,
                content: Some(UnifiedContentContainer::Blocks(blocks)),
                tool_calls: None,
                tool_call_id: None,
                cache_control: parts.last().and_then(|part| part.get("cache_control")).cloned(),
                thinking: None,
            })
        }
        _ => None,
    }
}

/// A single Anthropic message may expand into several unified messages: a
/// user turn's `tool_result` blocks each become their own `role:"tool"`
/// message.
fn convert_message(raw: &Value) -> Result<Vec<UnifiedMessage>> {
    let role = raw.get("role").and_then(Value::as_str).unwrap_or("user");
    let content = raw.get("content");

    match (role, content) {
        (_, Some(Value::String(text))) => {
            let role = role_from_str(role);
            Ok(vec![UnifiedMessage::text(role, text.clone())])
        }
        ("assistant", Some(Value::Array(parts))) => Ok(vec![convert_assistant_message(parts)]),
        (_, Some(Value::Array(parts))) => Ok(convert_user_parts(parts)),
        _ => Ok(vec![]),
    }
}

fn role_from_str(role: &str) -> UnifiedRole {
    match role {
        "assistant" => UnifiedRole::Assistant,
        "system" => UnifiedRole::System,
        _ => UnifiedRole::User,
    }
}

fn convert_user_parts(parts: &[Value]) -> Vec<UnifiedMessage> {
    let mut tool_messages = Vec::new();
    let mut text_blocks = Vec::new();

    for part in parts {
        match part.get("type").and_then(Value::as_str) {
            Some("tool_result") => {
                let tool_use_id = part.get("tool_use_id").and_then(Value::as_str).unwrap_or_default();
                let content = stringify_tool_result(part.get("content"));
                tool_messages.push(UnifiedMessage {
                    role: UnifiedRole::Tool,
                    content: Some(UnifiedContentContainer::Text(content)),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.to_string()),
                    cache_control: None,
                    thinking: None,
                });
            }
            Some("text") => {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    text_blocks.push(UnifiedContent::Text { text: text.to_string() });
                }
            }
            Some("image") => {
                if let Some(url) = image_url_from_source(part.get("source")) {
                    text_blocks.push(UnifiedContent::Image { url, detail: None });
                }
            }
            _ => {}
        }
    }

    if !text_blocks.is_empty() {
        tool_messages.push(UnifiedMessage {
            role: UnifiedRole::User,
            content: Some(UnifiedContentContainer::Blocks(text_blocks)),
            tool_calls: None,
            tool_call_id: None,
            cache_control: None,
            thinking: None,
        });
    }

    tool_messages
}

/// Anthropic image blocks carry a `source` object rather than a flat `url`;
/// collapse both its `url` and `base64` shapes into the single `url` string
/// the unified model expects (a `data:` URL for base64 sources).
fn image_url_from_source(source: Option<&Value>) -> Option<String> {
    let source = source?;
    match source.get("type").and_then(Value::as_str) {
        Some("url") => source.get("url").and_then(Value::as_str).map(str::to_string),
        Some("base64") => {
            let media_type = source.get("media_type").and_then(Value::as_str)?;
            let data = source.get("data").and_then(Value::as_str)?;
            Some(format!("data:{media_type};base64,{data}"))
        }
        _ => None,
    }
}

fn stringify_tool_result(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(value) => UnifiedToolResultContent::Json(value.clone()).into_string(),
        None => String::new(),
    }
}

fn convert_assistant_message(parts: &[Value]) -> UnifiedMessage {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for part in parts {
        match part.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    text_parts.push(text.to_string());
                }
            }
            Some("tool_use") => {
                let id = part.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                let name = part.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let input = part.get("input").cloned().unwrap_or(Value::Object(Default::default()));
                tool_calls.push(UnifiedToolCall {
                    id,
                    kind: ToolType::Function,
                    function: UnifiedFunctionCall {
                        name,
                        arguments: input.to_string(),
                    },
                });
            }
            _ => {}
        }
    }

    UnifiedMessage {
        role: UnifiedRole::Assistant,
        content: if text_parts.is_empty() {
            None
        } else {
            Some(UnifiedContentContainer::Text(text_parts.join("\n")))
        },
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
        cache_control: None,
        thinking: None,
    }
}

fn convert_tool(tool: &Value) -> UnifiedTool {
    UnifiedTool {
        kind: ToolType::Function,
        function: UnifiedFunction {
            name: tool.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            description: tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            parameters: tool.get("input_schema").cloned().unwrap_or(Value::Null),
        },
    }
}

fn convert_tool_choice(choice: &Value) -> Option<UnifiedToolChoice> {
    match choice.get("type").and_then(Value::as_str) {
        Some("auto") => Some(UnifiedToolChoice::Mode(UnifiedToolChoiceMode::Auto)),
        Some("any") => Some(UnifiedToolChoice::Mode(UnifiedToolChoiceMode::Required)),
        Some("none") => Some(UnifiedToolChoice::Mode(UnifiedToolChoiceMode::None)),
        Some("tool") => Some(UnifiedToolChoice::Specific {
            function: UnifiedFunctionChoice {
                name: choice.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            },
        }),
        _ => None,
    }
}

/// `stop`→`end_turn`, `length`→`max_tokens`, `tool_calls`→`tool_use`,
/// `content_filter`→`stop_sequence`, else `end_turn` (also
/// used by the buffered JSON converter).
pub(super) fn finish_reason_to_stop_reason(reason: &str) -> &'static str {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" => "tool_use",
        "content_filter" => "stop_sequence",
        _ => "end_turn",
    }
}

fn response_to_anthropic(value: &Value) -> Value {
    let choice = value.get("choices").and_then(|c| c.get(0));
    let message = choice.and_then(|c| c.get("message"));

    let mut content = Vec::new();
    if let Some(text) = message.and_then(|m| m.get("content")).and_then(Value::as_str) {
        if !text.is_empty() {
            content.push(json!({"type": "text", "text": text}));
        }
    }
    if let Some(tool_calls) = message.and_then(|m| m.get("tool_calls")).and_then(Value::as_array) {
        for call in tool_calls {
            let function = call.get("function");
            let input = function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .and_then(|s| serde_json::from_str::<Value>(s).ok())
                .unwrap_or(Value::Object(Default::default()));
            content.push(json!({
                "type": "tool_use",
                "id": call.get("id").cloned().unwrap_or(Value::Null),
                "name": function.and_then(|f| f.get("name")).cloned().unwrap_or(Value::Null),
                "input": input,
            }));
        }
    }

    let finish_reason = choice.and_then(|c| c.get("finish_reason")).and_then(Value::as_str);
    let stop_reason = finish_reason.map(finish_reason_to_stop_reason);

    let usage = value.get("usage");
    let input_tokens = usage.and_then(|u| u.get("prompt_tokens")).cloned().unwrap_or(json!(0));
    let output_tokens = usage
        .and_then(|u| u.get("completion_tokens"))
        .cloned()
        .unwrap_or(json!(0));

    json!({
        "id": value.get("id").cloned().unwrap_or(Value::Null),
        "type": "message",
        "role": "assistant",
        "content": content,
        "model": value.get("model").cloned().unwrap_or(Value::Null),
        "stop_reason": stop_reason,
        "stop_sequence": Value::Null,
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifts_string_system_into_leading_message() {
        let body = json!({
            "model": "claude-3-5-sonnet",
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}],
        });

        let unified = request_from_anthropic(&body).unwrap();
        assert_eq!(unified.messages[0].role, UnifiedRole::System);
    }

    #[test]
    fn splits_tool_result_and_text_into_separate_messages() {
        let body = json!({
            "model": "claude-3-5-sonnet",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "call_1", "content": "42"},
                    {"type": "text", "text": "thanks"}
                ]
            }],
        });

        let unified = request_from_anthropic(&body).unwrap();
        assert_eq!(unified.messages.len(), 2);
        assert_eq!(unified.messages[0].role, UnifiedRole::Tool);
        assert_eq!(unified.messages[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(unified.messages[1].role, UnifiedRole::User);
    }

    #[test]
    fn converts_url_and_base64_image_blocks() {
        let body = json!({
            "model": "claude-3-5-sonnet",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image", "source": {"type": "url", "url": "https://example.com/cat.png"}},
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}},
                    {"type": "text", "text": "what are these?"}
                ]
            }],
        });

        let unified = request_from_anthropic(&body).unwrap();
        let UnifiedContentContainer::Blocks(blocks) = unified.messages[0].content.as_ref().unwrap() else {
            panic!("expected block content");
        };
        assert_eq!(blocks.len(), 3);
        assert!(matches!(
            &blocks[0],
            UnifiedContent::Image { url, .. } if url == "https://example.com/cat.png"
        ));
        assert!(matches!(
            &blocks[1],
            UnifiedContent::Image { url, .. } if url == "data:image/png;base64,AAAA"
        ));
        assert!(matches!(&blocks[2], UnifiedContent::Text { text } if text == "what are these?"));
    }

    #[test]
    fn aggregates_assistant_text_and_tool_use_blocks() {
        let body = json!({
            "model": "claude-3-5-sonnet",
            "messages": [{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "checking"},
                    {"type": "tool_use", "id": "call_1", "name": "get_weather", "input": {"city": "nyc"}}
                ]
            }],
        });

        let unified = request_from_anthropic(&body).unwrap();
        assert_eq!(unified.messages.len(), 1);
        let tool_calls = unified.messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].function.name, "get_weather");
    }

    #[test]
    fn maps_finish_reasons_to_stop_reasons() {
        assert_eq!(finish_reason_to_stop_reason("tool_calls"), "tool_use");
        assert_eq!(finish_reason_to_stop_reason("length"), "max_tokens");
        assert_eq!(finish_reason_to_stop_reason("banana"), "end_turn");
    }
}
