//! OpenAI-chunk → Anthropic-event SSE converter.
//!
//! The hardest subsystem in the gateway: a small state machine walks a
//! stream of OpenAI `chat.completion.chunk` objects and emits the matching
//! sequence of Anthropic `message_*` / `content_block_*` SSE events,
//! tracking open content blocks and in-flight tool-call argument buffers
//! across chunks.

use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::{Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use serde_json::{Value, json};

use super::anthropic::finish_reason_to_stop_reason;
use crate::error::Result;
use crate::transform::{ChunkStream, ClientBody, ClientResponse, SseEvent};

pub fn encode(status: StatusCode, headers: HeaderMap, stream: ChunkStream) -> Result<ClientResponse> {
    let events = build_event_stream(stream);
    Ok(ClientResponse {
        status,
        headers,
        body: ClientBody::Sse(Box::pin(events)),
    })
}

/// Per-tool-call state, tracking the documented shape; `id`/`name`/
/// `args_buffer` exist for parity with that shape and the synthetic-upgrade
/// check even though this converter never re-reads the buffered arguments.
#[allow(dead_code)]
struct ToolCallState {
    id: String,
    name: String,
    args_buffer: String,
    block_index: usize,
    id_is_synthetic: bool,
    name_is_synthetic: bool,
}

/// Which content block, if any, is currently open and awaiting a
/// `content_block_stop`. At most one block is open at a time: opening a new
/// one (text, or a tool call under a new upstream index) always closes
/// whatever was open first.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    None,
    Text,
    Tool(usize),
}

struct Machine {
    message_id: String,
    model: Option<String>,
    has_started: bool,
    open_block: OpenBlock,
    next_content_index: usize,
    tool_calls: HashMap<usize, ToolCallState>,
    finished: bool,
}

impl Machine {
    fn new() -> Self {
        Self {
            message_id: format!("msg_{}", now_ms()),
            model: None,
            has_started: false,
            open_block: OpenBlock::None,
            next_content_index: 0,
            tool_calls: HashMap::new(),
            finished: false,
        }
    }
}

fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// Serializes `data` for the frame. On failure, escapes
/// backslashes and quotes in every string leaf and retries once before
/// giving up and emitting an empty object.
fn emit(out: &mut VecDeque<SseEvent>, event: &str, data: Value) {
    let encoded = serde_json::to_string(&data).unwrap_or_else(|_| {
        serde_json::to_string(&escape_strings(data.clone())).unwrap_or_else(|_| "{}".to_string())
    });
    out.push_back(SseEvent {
        event: Some(event.to_string()),
        data: encoded,
    });
}

fn escape_strings(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Array(items) => Value::Array(items.into_iter().map(escape_strings).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, escape_strings(v))).collect()),
        other => other,
    }
}

impl Machine {
    fn ensure_started(&mut self, chunk: &Value, out: &mut VecDeque<SseEvent>) {
        if self.has_started {
            return;
        }
        if let Some(model) = chunk.get("model").and_then(Value::as_str) {
            self.model = Some(model.to_string());
        }
        emit(
            out,
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": self.model,
                    "content": [],
                    "stop_reason": Value::Null,
                    "usage": {"input_tokens": 1, "output_tokens": 1},
                }
            }),
        );
        self.has_started = true;
    }

    fn close_open_block(&mut self, out: &mut VecDeque<SseEvent>) {
        if self.open_block == OpenBlock::None {
            return;
        }
        emit(
            out,
            "content_block_stop",
            json!({"type": "content_block_stop", "index": self.next_content_index}),
        );
        self.open_block = OpenBlock::None;
        self.next_content_index += 1;
    }

    fn process(&mut self, chunk: Value, out: &mut VecDeque<SseEvent>) {
        if self.finished {
            return;
        }

        if let Some(error) = chunk.get("error") {
            emit(
                out,
                "error",
                json!({"type": "api_error", "message": error.to_string()}),
            );
            return;
        }

        self.ensure_started(&chunk, out);

        let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
            return;
        };
        let delta = choice.get("delta").cloned().unwrap_or(Value::Null);

        if let Some(thinking) = delta.get("thinking") {
            if let Some(content) = thinking.get("content").and_then(Value::as_str) {
                emit(
                    out,
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.next_content_index,
                        "delta": {"type": "thinking_delta", "thinking": content},
                    }),
                );
            }
            if let Some(signature) = thinking.get("signature").and_then(Value::as_str) {
                emit(
                    out,
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.next_content_index,
                        "delta": {"type": "signature_delta", "signature": signature},
                    }),
                );
                emit(
                    out,
                    "content_block_stop",
                    json!({"type": "content_block_stop", "index": self.next_content_index}),
                );
                self.next_content_index += 1;
            }
        }

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                if self.open_block != OpenBlock::Text {
                    self.close_open_block(out);
                    emit(
                        out,
                        "content_block_start",
                        json!({
                            "type": "content_block_start",
                            "index": self.next_content_index,
                            "content_block": {"type": "text", "text": ""},
                        }),
                    );
                    self.open_block = OpenBlock::Text;
                }
                emit(
                    out,
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.next_content_index,
                        "delta": {"type": "text_delta", "text": content},
                    }),
                );
            }
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in tool_calls {
                self.process_tool_call_delta(call, out);
            }
        }

        if let Some(finish_reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.close_open_block(out);
            self.tool_calls.clear();
            emit(
                out,
                "message_delta",
                json!({
                    "type": "message_delta",
                    "delta": {"stop_reason": finish_reason_to_stop_reason(finish_reason), "stop_sequence": Value::Null},
                    "usage": chunk.get("usage").cloned().unwrap_or(json!({"output_tokens": 0})),
                }),
            );
            emit(out, "message_stop", json!({"type": "message_stop"}));
            self.finished = true;
        }
    }

    fn process_tool_call_delta(&mut self, call: &Value, out: &mut VecDeque<SseEvent>) {
        let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
        let function = call.get("function");
        let incoming_id = call.get("id").and_then(Value::as_str);
        let incoming_name = function.and_then(|f| f.get("name")).and_then(Value::as_str);

        if !self.tool_calls.contains_key(&index) {
            self.close_open_block(out);

            let id = incoming_id
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("call_{}_{index}", now_ms()));
            let name = incoming_name.unwrap_or_default().to_string();
            let block_index = self.next_content_index;

            emit(
                out,
                "content_block_start",
                json!({
                    "type": "content_block_start",
                    "index": block_index,
                    "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}},
                }),
            );

            self.tool_calls.insert(
                index,
                ToolCallState {
                    id,
                    name,
                    args_buffer: String::new(),
                    block_index,
                    id_is_synthetic: incoming_id.is_none(),
                    name_is_synthetic: incoming_name.is_none(),
                },
            );
            self.open_block = OpenBlock::Tool(index);
        } else if let Some(state) = self.tool_calls.get_mut(&index) {
            if state.id_is_synthetic {
                if let Some(id) = incoming_id {
                    state.id = id.to_string();
                    state.id_is_synthetic = false;
                }
            }
            if state.name_is_synthetic {
                if let Some(name) = incoming_name {
                    state.name = name.to_string();
                    state.name_is_synthetic = false;
                }
            }
        }

        if let Some(fragment) = function.and_then(|f| f.get("arguments")).and_then(Value::as_str) {
            if let Some(state) = self.tool_calls.get_mut(&index) {
                state.args_buffer.push_str(fragment);
                let block_index = state.block_index;
                emit(
                    out,
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": block_index,
                        "delta": {"type": "input_json_delta", "partial_json": fragment},
                    }),
                );
            }
        }
    }
}

struct GenState {
    inner: ChunkStream,
    pending: VecDeque<SseEvent>,
    machine: Machine,
    ended: bool,
}

fn build_event_stream(stream: ChunkStream) -> impl Stream<Item = Result<SseEvent>> + Send {
    let init = GenState {
        inner: stream,
        pending: VecDeque::new(),
        machine: Machine::new(),
        ended: false,
    };

    futures::stream::unfold(init, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
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
                Some(Ok(chunk)) => {
                    state.machine.process(chunk, &mut state.pending);
                    if state.machine.finished {
                        state.ended = true;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunk_stream(chunks: Vec<Value>) -> ChunkStream {
        Box::pin(stream::iter(chunks.into_iter().map(Ok)))
    }

    async fn collect_events(chunks: Vec<Value>) -> Vec<SseEvent> {
        build_event_stream(chunk_stream(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn text_only_stream_emits_start_delta_stop() {
        let events = collect_events(vec![
            json!({"model": "gpt-4o", "choices": [{"index": 0, "delta": {"content": "hi"}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}], "usage": {"output_tokens": 1}}),
        ])
        .await;

        let event_names: Vec<_> = events.iter().filter_map(|e| e.event.as_deref()).collect();
        assert_eq!(
            event_names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[tokio::test]
    async fn tool_call_upgrades_synthetic_id_in_place() {
        let events = collect_events(vec![
            json!({"model": "gpt-4o", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"a\":"}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "call_real", "function": {"name": "get_weather", "arguments": "1}"}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        ])
        .await;

        let start = events
            .iter()
            .find(|e| e.event.as_deref() == Some("content_block_start"))
            .unwrap();
        assert!(start.data.contains("\"type\":\"tool_use\""));
    }

    #[tokio::test]
    async fn tool_call_block_closes_before_message_delta() {
        let events = collect_events(vec![
            json!({"model": "gpt-4o", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "c1", "function": {"name": "f", "arguments": "{\"x\":"}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "1}"}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        ])
        .await;

        let event_names: Vec<_> = events.iter().filter_map(|e| e.event.as_deref()).collect();
        assert_eq!(
            event_names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[tokio::test]
    async fn second_tool_call_closes_first_block_before_opening() {
        let events = collect_events(vec![
            json!({"model": "gpt-4o", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "c1", "function": {"name": "f1", "arguments": "{}"}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 1, "id": "c2", "function": {"name": "f2", "arguments": "{}"}}]}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        ])
        .await;

        let event_names: Vec<_> = events.iter().filter_map(|e| e.event.as_deref()).collect();
        // start(0), delta(0), stop(0) [closed when block 1 opens], start(1), delta(1), stop(1) [at finish]
        assert_eq!(
            event_names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[tokio::test]
    async fn error_chunk_emits_error_event_and_continues() {
        let events = collect_events(vec![
            json!({"error": {"message": "boom"}}),
            json!({"model": "gpt-4o", "choices": [{"index": 0, "delta": {"content": "ok"}, "finish_reason": "stop"}]}),
        ])
        .await;

        assert!(events.iter().any(|e| e.event.as_deref() == Some("error")));
        assert!(events.iter().any(|e| e.event.as_deref() == Some("message_stop")));
    }
}
