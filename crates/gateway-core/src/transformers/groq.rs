//! `groq` utility transformer: strips `cache_control` and a
//! tool's `$schema` key before egress (Groq's JSON-schema validator rejects
//! both), and on streaming responses assigns fresh tool-call ids and bumps
//! the choice index once a tool call follows text.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::error::Result;
use crate::registry::ProviderRecord;
use crate::transform::{ChunkStream, RawResponse, ResponseBody, TransformConfig, Transformer};
use crate::unified::UnifiedRequest;

#[derive(Debug, Default)]
pub struct Groq;

#[async_trait]
impl Transformer for Groq {
    fn name(&self) -> &str {
        "groq"
    }

    fn transform_request_in(
        &self,
        mut unified: UnifiedRequest,
        provider: &ProviderRecord,
    ) -> Result<(UnifiedRequest, TransformConfig)> {
        let _ = provider;
        for message in &mut unified.messages {
            message.cache_control = None;
        }
        if let Some(tools) = &mut unified.tools {
            for tool in tools {
                if let Some(obj) = tool.function.parameters.as_object_mut() {
                    obj.remove("$schema");
                }
            }
        }
        Ok((unified, TransformConfig::default()))
    }

    async fn transform_response_out(&self, response: &mut RawResponse) -> Result<()> {
        if let ResponseBody::Stream(stream) = &mut response.body {
            let owned = std::mem::replace(stream, Box::pin(futures::stream::empty()));
            *stream = rewrite_stream(owned);
        }
        Ok(())
    }
}

struct RewriteState {
    inner: ChunkStream,
    text_seen: bool,
}

fn rewrite_stream(stream: ChunkStream) -> ChunkStream {
    let init = RewriteState {
        inner: stream,
        text_seen: false,
    };

    Box::pin(futures::stream::unfold(init, |mut state| async move {
        match state.inner.next().await {
            None => None,
            Some(Err(err)) => Some((Err(err), state)),
            Some(Ok(mut chunk)) => {
                rewrite_chunk(&mut chunk, &mut state.text_seen);
                Some((Ok(chunk), state))
            }
        }
    }))
}

fn rewrite_chunk(chunk: &mut Value, text_seen: &mut bool) {
    let Some(choice) = chunk.get_mut("choices").and_then(|choices| choices.get_mut(0)) else {
        return;
    };

    let has_text = choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .is_some_and(|text| !text.is_empty());
    if has_text {
        *text_seen = true;
    }

    let has_tool_calls = choice
        .get("delta")
        .and_then(|delta| delta.get("tool_calls"))
        .is_some_and(|calls| !calls.is_null());
    if !has_tool_calls {
        return;
    }

    if *text_seen {
        if let Some(index) = choice.get_mut("index") {
            *index = json!(1);
        }
    }

    if let Some(tool_calls) = choice
        .get_mut("delta")
        .and_then(|delta| delta.get_mut("tool_calls"))
        .and_then(Value::as_array_mut)
    {
        for call in tool_calls {
            if let Some(obj) = call.as_object_mut() {
                obj.insert("id".to_string(), json!(format!("call_{}", uuid::Uuid::new_v4())));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn run(chunks: Vec<Value>) -> Vec<Value> {
        let input: ChunkStream = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
        futures::executor::block_on(rewrite_stream(input).map(|item| item.unwrap()).collect())
    }

    #[test]
    fn reassigns_tool_call_ids() {
        let out = run(vec![json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "original", "function": {"name": "f"}}]}}]
        })]);
        let id = out[0]["choices"][0]["delta"]["tool_calls"][0]["id"].as_str().unwrap();
        assert!(id.starts_with("call_"));
        assert_ne!(id, "original");
    }

    #[test]
    fn assigns_id_when_groq_omits_one() {
        let out = run(vec![json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"name": "f"}}]}}]
        })]);
        let id = out[0]["choices"][0]["delta"]["tool_calls"][0]["id"].as_str().unwrap();
        assert!(id.starts_with("call_"));
    }

    #[test]
    fn bumps_index_when_tool_call_follows_text() {
        let out = run(vec![
            json!({"choices": [{"index": 0, "delta": {"content": "hi"}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "x", "function": {"name": "f"}}]}}]}),
        ]);
        assert_eq!(out[1]["choices"][0]["index"], json!(1));
    }
}
