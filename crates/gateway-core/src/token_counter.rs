//! Token counting for the router (component I).
//!
//! Operates on the raw client JSON body — the router runs before
//! `transform_request_out`, so it sees whatever dialect shape the client
//! sent, not the unified form. The counting rules are therefore driven by
//! generic JSON field probing rather than typed unified structs.

use serde_json::Value;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

fn encoder() -> Option<&'static CoreBPE> {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().ok()).as_ref()
}

/// Count tokens in `text`, falling back to `ceil(len(bytes)/4)` when the
/// BPE tokenizer could not be loaded.
fn count_text(text: &str) -> usize {
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.len().div_ceil(4),
    }
}

/// Count the tokens a request body would cost:
/// every message's content, the `system` field (string or content-part
/// array), and every tool's `name + description` plus its JSON-encoded
/// parameter schema.
pub fn count_request_tokens(body: &Value) -> usize {
    let mut total = 0;

    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        for message in messages {
            total += count_message_content(message.get("content").unwrap_or(&Value::Null));
        }
    }

    if let Some(system) = body.get("system") {
        total += count_system(system);
    }

    if let Some(tools) = body.get("tools").and_then(Value::as_array) {
        for tool in tools {
            total += count_tool(tool);
        }
    }

    total
}

fn count_system(system: &Value) -> usize {
    match system {
        Value::String(text) => count_text(text),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .map(count_text)
            .sum(),
        _ => 0,
    }
}

fn count_message_content(content: &Value) -> usize {
    match content {
        Value::String(text) => count_text(text),
        Value::Array(parts) => parts.iter().map(count_content_part).sum(),
        _ => 0,
    }
}

fn count_content_part(part: &Value) -> usize {
    match part.get("type").and_then(Value::as_str) {
        Some("text") => part.get("text").and_then(Value::as_str).map(count_text).unwrap_or(0),
        Some("tool_use") => part
            .get("input")
            .map(|input| count_text(&input.to_string()))
            .unwrap_or(0),
        Some("tool_result") => match part.get("content") {
            Some(Value::String(text)) => count_text(text),
            Some(value) => count_text(&value.to_string()),
            None => 0,
        },
        _ => 0,
    }
}

fn count_tool(tool: &Value) -> usize {
    // Anthropic-shaped tools carry name/description/input_schema at the top
    // level; OpenAI-shaped tools nest them under `function`.
    let function = tool.get("function").unwrap_or(tool);

    let name = function.get("name").and_then(Value::as_str).unwrap_or_default();
    let description = function.get("description").and_then(Value::as_str).unwrap_or_default();

    let schema = function
        .get("input_schema")
        .or_else(|| function.get("parameters"))
        .cloned()
        .unwrap_or(Value::Null);

    count_text(&format!("{name}{description}")) + count_text(&schema.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_plain_user_text() {
        let body = json!({"messages": [{"role": "user", "content": "hello there"}]});
        assert!(count_request_tokens(&body) > 0);
    }

    #[test]
    fn counts_system_array_and_tools() {
        let body = json!({
            "messages": [],
            "system": [{"type": "text", "text": "be nice"}],
            "tools": [{"name": "get_weather", "description": "fetch weather", "input_schema": {"type": "object"}}]
        });

        assert!(count_request_tokens(&body) > 0);
    }

    #[test]
    fn empty_body_counts_to_zero() {
        assert_eq!(count_request_tokens(&json!({})), 0);
    }
}
