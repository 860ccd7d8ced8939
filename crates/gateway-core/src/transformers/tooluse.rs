//! `tooluse` utility transformer: the forced-tool-exit mode.
//! Injects an `ExitTool` declaration and forces `tool_choice: "required"`,
//! then on the way back rewrites an `ExitTool` call into a plain assistant
//! text message — buffering fragmented arguments across stream chunks
//! until they parse as JSON.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::error::Result;
use crate::registry::ProviderRecord;
use crate::transform::{ChunkStream, RawResponse, ResponseBody, TransformConfig, Transformer};
use crate::unified::{
    ToolType, UnifiedFunction, UnifiedMessage, UnifiedRequest, UnifiedRole, UnifiedTool, UnifiedToolChoice,
    UnifiedToolChoiceMode,
};

const EXIT_TOOL_NAME: &str = "ExitTool";
const NOTICE: &str =
    "Tool mode is active. The only way to end this turn is to call ExitTool with your final response.";

#[derive(Debug, Default)]
pub struct ToolUse;

#[async_trait]
impl Transformer for ToolUse {
    fn name(&self) -> &str {
        "tooluse"
    }

    fn transform_request_in(
        &self,
        mut unified: UnifiedRequest,
        provider: &ProviderRecord,
    ) -> Result<(UnifiedRequest, TransformConfig)> {
        let _ = provider;
        unified.messages.push(UnifiedMessage::text(UnifiedRole::System, NOTICE));

        if let Some(tools) = &mut unified.tools {
            tools.insert(
                0,
                UnifiedTool {
                    kind: ToolType::Function,
                    function: UnifiedFunction {
                        name: EXIT_TOOL_NAME.to_string(),
                        description: "Call this once you are ready to give your final response.".to_string(),
                        parameters: json!({
                            "type": "object",
                            "properties": {"response": {"type": "string"}},
                            "required": ["response"],
                        }),
                    },
                },
            );
            unified.tool_choice = Some(UnifiedToolChoice::Mode(UnifiedToolChoiceMode::Required));
        }

        Ok((unified, TransformConfig::default()))
    }

    async fn transform_response_out(&self, response: &mut RawResponse) -> Result<()> {
        match &mut response.body {
            ResponseBody::Buffered(value) => rewrite_buffered(value),
            ResponseBody::Stream(stream) => {
                let owned = std::mem::replace(stream, Box::pin(futures::stream::empty()));
                *stream = rewrite_stream(owned);
            }
        }
        Ok(())
    }
}

fn is_exit_tool_call(call: &Value) -> bool {
    call.get("function").and_then(|f| f.get("name")).and_then(Value::as_str) == Some(EXIT_TOOL_NAME)
}

fn parsed_response(arguments: &str) -> String {
    serde_json::from_str::<Value>(arguments)
        .ok()
        .and_then(|value| value.get("response").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| arguments.to_string())
}

fn rewrite_buffered(value: &mut Value) {
    let Some(choices) = value.get_mut("choices").and_then(Value::as_array_mut) else {
        return;
    };

    for choice in choices {
        let exit_arguments = choice
            .get("message")
            .and_then(|message| message.get("tool_calls"))
            .and_then(Value::as_array)
            .and_then(|calls| calls.iter().find(|call| is_exit_tool_call(call)))
            .and_then(|call| call.get("function"))
            .and_then(|function| function.get("arguments"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(arguments) = exit_arguments else {
            continue;
        };

        let response_text = parsed_response(&arguments);
        if let Some(message) = choice.get_mut("message").and_then(Value::as_object_mut) {
            message.remove("tool_calls");
            message.insert("role".to_string(), json!("assistant"));
            message.insert("content".to_string(), json!(response_text));
        }
        if let Some(choice_obj) = choice.as_object_mut() {
            choice_obj.insert("finish_reason".to_string(), json!("stop"));
        }
    }
}

struct RewriteState {
    inner: ChunkStream,
    pending: VecDeque<Result<Value>>,
    exit_tool_index: Option<usize>,
    buffer: String,
    suppressing: bool,
    ended: bool,
}

fn rewrite_stream(stream: ChunkStream) -> ChunkStream {
    let init = RewriteState {
        inner: stream,
        pending: VecDeque::new(),
        exit_tool_index: None,
        buffer: String::new(),
        suppressing: false,
        ended: false,
    };

    Box::pin(futures::stream::unfold(init, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.ended {
                return None;
            }
            match state.inner.next().await {
                None => {
                    state.ended = true;
                    return None;
                }
                Some(Err(err)) => {
                    state.ended = true;
                    return Some((Err(err), state));
                }
                Some(Ok(chunk)) => process_chunk(&mut state, chunk),
            }
        }
    }))
}

fn process_chunk(state: &mut RewriteState, chunk: Value) {
    let Some(choice) = chunk.get("choices").and_then(|choices| choices.get(0)) else {
        state.pending.push_back(Ok(chunk));
        return;
    };

    let tool_call = choice.get("delta").and_then(|delta| delta.get("tool_calls")).and_then(|calls| calls.get(0));

    if let Some(call) = tool_call {
        let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
        if is_exit_tool_call(call) || state.exit_tool_index == Some(index) {
            state.exit_tool_index = Some(index);
            state.suppressing = true;
            if let Some(fragment) = call.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                state.buffer.push_str(fragment);
            }
            if let Ok(parsed) = serde_json::from_str::<Value>(&state.buffer) {
                let response_text = parsed
                    .get("response")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| state.buffer.clone());
                state.pending.push_back(Ok(json!({
                    "object": "chat.completion.chunk",
                    "choices": [{"index": 0, "delta": {"content": response_text}, "finish_reason": Value::Null}],
                })));
                state.pending.push_back(Ok(json!({
                    "object": "chat.completion.chunk",
                    "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
                })));
                state.buffer.clear();
            }
            return;
        }
    }

    if state.suppressing && choice.get("finish_reason").and_then(Value::as_str).is_some() {
        return;
    }

    state.pending.push_back(Ok(chunk));
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn rewrites_buffered_exit_tool_call_into_text() {
        let mut response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{"function": {"name": "ExitTool", "arguments": "{\"response\":\"done\"}"}}],
                },
            }],
        });
        rewrite_buffered(&mut response);
        assert_eq!(response["choices"][0]["message"]["content"], json!("done"));
        assert!(response["choices"][0]["message"].get("tool_calls").is_none());
        assert_eq!(response["choices"][0]["finish_reason"], json!("stop"));
    }

    #[test]
    fn streams_exit_tool_fragments_into_one_content_chunk() {
        let chunks = vec![
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"name": "ExitTool", "arguments": "{\"resp"}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "onse\":\"hi\"}"}}]}}]}),
        ];
        let input: ChunkStream = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
        let out: Vec<Value> =
            futures::executor::block_on(rewrite_stream(input).map(|item| item.unwrap()).collect());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["choices"][0]["delta"]["content"], json!("hi"));
        assert_eq!(out[1]["choices"][0]["finish_reason"], json!("stop"));
    }
}
