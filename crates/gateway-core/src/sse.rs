//! Generic SSE decoding shared by egress and the dialect converters.
//!
//! Upstream wire shape (OpenAI-compatible, Gemini, or otherwise) is opaque
//! here: frames are parsed into bare [`serde_json::Value`]s. Dialect-aware
//! conversion into OpenAI-shaped chunks happens in the provider's
//! `transform_response_out` hook, not here.

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures_util::StreamExt;
use serde_json::Value;

use crate::error::{GatewayError, Result};

const DONE_SENTINEL: &str = "[DONE]";

/// Turn a raw upstream byte stream into a stream of parsed `data:` frames,
/// stopping (without error) at the `[DONE]` sentinel some providers send.
pub fn decode_json_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<Value>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    byte_stream
        .eventsource()
        .filter_map(|frame| async move {
            match frame {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() || data == DONE_SENTINEL {
                        return None;
                    }
                    Some(serde_json::from_str::<Value>(data).map_err(GatewayError::from))
                }
                Err(err) => Some(Err(GatewayError::ProviderConnectionError(err.to_string()))),
            }
        })
}
