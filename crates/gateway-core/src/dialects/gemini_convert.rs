//! Gemini wire conversion: unified → Gemini request
//! body, and Gemini JSON/SSE → OpenAI-shaped response/chunk.

use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::transform::{RawResponse, ResponseBody};
use crate::unified::{UnifiedContent, UnifiedContentContainer, UnifiedMessage, UnifiedRequest, UnifiedRole};

pub fn unified_to_gemini_request(unified: &UnifiedRequest) -> Value {
    let contents: Vec<Value> = unified
        .messages
        .iter()
        .filter(|m| m.role != UnifiedRole::System)
        .map(message_to_gemini_content)
        .collect();

    let system_instruction = unified
        .messages
        .iter()
        .find(|m| m.role == UnifiedRole::System)
        .and_then(|m| m.content.as_ref())
        .map(|content| json!({"parts": [{"text": content.as_joined_text()}]}));

    let mut body = Map::new();
    body.insert("contents".to_string(), Value::Array(contents));
    if let Some(system_instruction) = system_instruction {
        body.insert("systemInstruction".to_string(), system_instruction);
    }

    if let Some(tools) = &unified.tools {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let mut parameters = tool.function.parameters.clone();
                strip_unsupported_schema_keys(&mut parameters);
                json!({
                    "name": tool.function.name,
                    "description": tool.function.description,
                    "parameters": parameters,
                })
            })
            .collect();
        body.insert(
            "tools".to_string(),
            json!([{"functionDeclarations": declarations}]),
        );
    }

    Value::Object(body)
}

fn message_to_gemini_content(message: &UnifiedMessage) -> Value {
    let role = if message.role == UnifiedRole::Assistant {
        "model"
    } else {
        "user"
    };

    let mut parts = Vec::new();
    if let Some(content) = &message.content {
        match content {
            UnifiedContentContainer::Text(text) => parts.push(json!({"text": text})),
            UnifiedContentContainer::Blocks(blocks) => {
                for block in blocks {
                    if let Some(text) = block.as_text() {
                        parts.push(json!({"text": text}));
                    } else if let UnifiedContent::Image { url, .. } = block {
                        if let Some(part) = gemini_image_part(url) {
                            parts.push(part);
                        }
                    }
                }
            }
        }
    }
    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            let args = serde_json::from_str::<Value>(&call.function.arguments).unwrap_or(Value::Null);
            parts.push(json!({
                "functionCall": {"id": call.id, "name": call.function.name, "args": args}
            }));
        }
    }

    json!({"role": role, "parts": parts})
}

/// Gemini has no flat `url` image shape: a `data:` URL becomes `inlineData`
/// (mime type + bare base64), anything else becomes `fileData` (Gemini only
/// accepts `fileData.fileUri` for files it already has a handle to, but this
/// at least round-trips the URL rather than dropping the block).
fn gemini_image_part(url: &str) -> Option<Value> {
    if let Some(rest) = url.strip_prefix("data:") {
        let (mime_type, data) = rest.split_once(";base64,")?;
        Some(json!({"inlineData": {"mimeType": mime_type, "data": data}}))
    } else {
        Some(json!({"fileData": {"fileUri": url}}))
    }
}

/// Strip `$schema`, `additionalProperties`, and any `format` value other
/// than `enum`/`date-time` from every subtree.
fn strip_unsupported_schema_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("additionalProperties");
            if let Some(format) = map.get("format").and_then(Value::as_str) {
                if format != "enum" && format != "date-time" {
                    map.remove("format");
                }
            }
            for nested in map.values_mut() {
                strip_unsupported_schema_keys(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_unsupported_schema_keys(item);
            }
        }
        _ => {}
    }
}

pub fn convert_response_out(response: &mut RawResponse) -> Result<()> {
    match &mut response.body {
        ResponseBody::Buffered(value) => {
            *value = gemini_json_to_openai(value);
        }
        ResponseBody::Stream(stream) => {
            let owned = std::mem::replace(stream, Box::pin(futures::stream::empty()));
            let converted = futures::StreamExt::flat_map(owned, |item| match item {
                Ok(chunk) => futures::stream::iter(gemini_chunk_to_openai(&chunk).into_iter().map(Ok).collect::<Vec<_>>()),
                Err(err) => futures::stream::iter(vec![Err(err)]),
            });
            response.body = ResponseBody::Stream(Box::pin(converted));
        }
    }
    Ok(())
}

fn gemini_candidate_parts(value: &Value) -> (String, Vec<Value>, Option<String>) {
    let candidate = value.get("candidates").and_then(|c| c.get(0));
    let parts = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    let tool_calls: Vec<Value> = parts
        .iter()
        .filter_map(|part| part.get("functionCall"))
        .map(|call| {
            json!({
                "id": call.get("id").cloned().unwrap_or(json!("call_0")),
                "type": "function",
                "function": {
                    "name": call.get("name").cloned().unwrap_or(Value::Null),
                    "arguments": call.get("args").map(|a| a.to_string()).unwrap_or_default(),
                }
            })
        })
        .collect();

    let finish_reason = candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
        .map(|s| s.to_lowercase());

    (text, tool_calls, finish_reason)
}

fn gemini_json_to_openai(value: &Value) -> Value {
    let (text, tool_calls, finish_reason) = gemini_candidate_parts(value);

    let usage = value.get("usageMetadata");
    let prompt_tokens = usage.and_then(|u| u.get("promptTokenCount")).cloned().unwrap_or(json!(0));
    let completion_tokens = usage
        .and_then(|u| u.get("candidatesTokenCount"))
        .cloned()
        .unwrap_or(json!(0));
    let total_tokens = usage.and_then(|u| u.get("totalTokenCount")).cloned().unwrap_or(json!(0));

    json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": text,
                "tool_calls": if tool_calls.is_empty() { Value::Null } else { Value::Array(tool_calls) },
            },
            "finish_reason": finish_reason,
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": total_tokens,
        },
    })
}

/// A Gemini chunk can carry text and a `functionCall` together; the
/// downstream Anthropic SSE converter only ever reads `choices[0]` of a
/// single `chat.completion.chunk`, so each logical event becomes its own
/// emitted chunk rather than extra entries in one `choices` array. When a
/// chunk carries both, the tool call's `delta.tool_calls[].index` shifts to
/// `1` (and beyond, for multiple calls) so the Anthropic converter treats it
/// as a new block rather than a continuation of the just-closed text block.
fn gemini_chunk_to_openai(value: &Value) -> Vec<Value> {
    let (text, tool_calls, finish_reason) = gemini_candidate_parts(value);

    let mut chunks = Vec::new();
    if !text.is_empty() {
        chunks.push(json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": Value::Null}],
        }));
    }
    if !tool_calls.is_empty() {
        let base_index = if text.is_empty() { 0 } else { 1 };
        let deltas: Vec<Value> = tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| {
                json!({
                    "index": base_index + i,
                    "id": call.get("id").cloned().unwrap_or(Value::Null),
                    "function": call.get("function").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();
        chunks.push(json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"tool_calls": deltas}, "finish_reason": Value::Null}],
        }));
    }
    if let Some(finish_reason) = finish_reason {
        chunks.push(json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {}, "finish_reason": finish_reason}],
        }));
    }
    if chunks.is_empty() {
        chunks.push(json!({"object": "chat.completion.chunk", "choices": []}));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_unsupported_schema_keys_recursively() {
        let mut schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "when": {"type": "string", "format": "date-time"},
                "color": {"type": "string", "format": "uri"},
            },
            "additionalProperties": false,
        });

        strip_unsupported_schema_keys(&mut schema);

        assert!(schema.get("$schema").is_none());
        assert!(schema.get("additionalProperties").is_none());
        assert_eq!(schema["properties"]["when"]["format"], json!("date-time"));
        assert!(schema["properties"]["color"].get("format").is_none());
    }

    #[test]
    fn unified_image_blocks_become_inline_or_file_data_parts() {
        use crate::unified::{UnifiedMessage, UnifiedRole};

        let message = UnifiedMessage {
            role: UnifiedRole::User,
            content: Some(UnifiedContentContainer::Blocks(vec![
                UnifiedContent::Image {
                    url: "data:image/png;base64,AAAA".to_string(),
                    detail: None,
                },
                UnifiedContent::Image {
                    url: "https://example.com/cat.png".to_string(),
                    detail: None,
                },
            ])),
            tool_calls: None,
            tool_call_id: None,
            cache_control: None,
            thinking: None,
        };

        let content = message_to_gemini_content(&message);
        let parts = content["parts"].as_array().unwrap();
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("AAAA"));
        assert_eq!(parts[1]["fileData"]["fileUri"], json!("https://example.com/cat.png"));
    }

    #[test]
    fn converts_gemini_json_response_to_openai_shape() {
        let gemini = json!({
            "candidates": [{
                "content": {"parts": [{"text": "hi"}, {"text": "there"}]},
                "finishReason": "STOP",
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5},
        });

        let openai = gemini_json_to_openai(&gemini);
        assert_eq!(openai["choices"][0]["message"]["content"], json!("hi\nthere"));
        assert_eq!(openai["choices"][0]["finish_reason"], json!("stop"));
        assert_eq!(openai["usage"]["total_tokens"], json!(5));
    }
}
