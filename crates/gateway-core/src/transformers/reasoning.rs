//! Shared reasoning→thinking stream rewrite, implemented once
//! over a pluggable delta field name rather than duplicated between
//! `deepseek` (`reasoning_content`) and `openrouter` (`reasoning`).
//!
//! Each reasoning fragment is forwarded immediately as a `delta.thinking.content`
//! chunk and also buffered; the first chunk carrying real `delta.content`
//! triggers a closing chunk carrying the buffered reasoning and a
//! `now_ms()` signature, after which every subsequent choice's `index` is
//! bumped by one so a downstream Anthropic SSE conversion opens a fresh
//! content block.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use serde_json::{Value, json};

use crate::error::Result;
use crate::transform::ChunkStream;

fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

struct RewriteState {
    inner: ChunkStream,
    pending: VecDeque<Result<Value>>,
    field: &'static str,
    buffer: String,
    closed: bool,
    ended: bool,
}

pub fn rewrite_stream(stream: ChunkStream, field: &'static str) -> ChunkStream {
    let init = RewriteState {
        inner: stream,
        pending: VecDeque::new(),
        field,
        buffer: String::new(),
        closed: false,
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
                Some(Ok(chunk)) => process(&mut state, chunk),
            }
        }
    }))
}

fn process(state: &mut RewriteState, mut chunk: Value) {
    let reasoning_fragment = chunk
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get(state.field))
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(fragment) = reasoning_fragment {
        state.buffer.push_str(&fragment);
        if let Some(delta) = choice_delta_mut(&mut chunk) {
            if let Some(obj) = delta.as_object_mut() {
                obj.remove(state.field);
                obj.insert("thinking".to_string(), json!({"content": fragment}));
            }
        }
        state.pending.push_back(Ok(chunk));
        return;
    }

    let has_content = chunk
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .is_some_and(|text| !text.is_empty());

    if has_content && !state.closed {
        state.closed = true;
        state.pending.push_back(Ok(json!({
            "object": "chat.completion.chunk",
            "choices": [{
                "index": 0,
                "delta": {"thinking": {"content": state.buffer, "signature": now_ms().to_string()}},
                "finish_reason": Value::Null,
            }],
        })));
        state.buffer.clear();
    }

    if state.closed {
        bump_index(&mut chunk);
    }
    state.pending.push_back(Ok(chunk));
}

fn choice_delta_mut(chunk: &mut Value) -> Option<&mut Value> {
    chunk.get_mut("choices")?.get_mut(0)?.get_mut("delta")
}

fn bump_index(chunk: &mut Value) {
    if let Some(choices) = chunk.get_mut("choices").and_then(Value::as_array_mut) {
        for choice in choices {
            if let Some(index) = choice.get_mut("index") {
                *index = json!(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn run(chunks: Vec<Value>, field: &'static str) -> Vec<Value> {
        let input: ChunkStream = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
        futures::executor::block_on(rewrite_stream(input, field).map(|item| item.unwrap()).collect())
    }

    #[test]
    fn reasoning_fragments_become_thinking_deltas() {
        let out = run(
            vec![json!({"choices": [{"index": 0, "delta": {"reasoning_content": "pondering"}}]})],
            "reasoning_content",
        );
        assert_eq!(out[0]["choices"][0]["delta"]["thinking"]["content"], json!("pondering"));
        assert!(out[0]["choices"][0]["delta"].get("reasoning_content").is_none());
    }

    #[test]
    fn first_content_chunk_closes_thinking_and_bumps_index() {
        let out = run(
            vec![
                json!({"choices": [{"index": 0, "delta": {"reasoning_content": "hmm"}}]}),
                json!({"choices": [{"index": 0, "delta": {"content": "answer"}}]}),
                json!({"choices": [{"index": 0, "delta": {"content": " more"}}]}),
            ],
            "reasoning_content",
        );
        assert_eq!(out.len(), 4);
        assert_eq!(out[1]["choices"][0]["delta"]["thinking"]["content"], json!("hmm"));
        assert!(out[1]["choices"][0]["delta"]["thinking"]["signature"].is_string());
        assert_eq!(out[2]["choices"][0]["index"], json!(1));
        assert_eq!(out[3]["choices"][0]["index"], json!(1));
    }
}
