//! The transformer capability set (see the design note on
//! "polymorphism over transformers").
//!
//! A transformer is a bundle of up to four optional hooks. Rather than model
//! that as a trait object hierarchy, every hook is a trait method with an
//! identity default — implementing only the hooks that matter is the whole
//! mechanism; there's no separate "capability flag" to keep in sync.

use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use futures::Stream;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::{registry::ProviderRecord, unified::UnifiedRequest};

pub type Result<T> = std::result::Result<T, crate::error::GatewayError>;

/// A stream of already-JSON-parsed upstream chunks (OpenAI `chat.completion.chunk`
/// shape, after any provider-native translation).
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// One rendered Server-Sent-Events frame, ready to write to the client.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent>> + Send>>;

/// Per-request overrides a transformer's request hook can hand back to the
/// pipeline engine — merged into a running `ctx`, later writes win.
#[derive(Debug, Clone, Default)]
pub struct TransformConfig {
    pub url: Option<url::Url>,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
    /// Set by a provider-native transformer (e.g. Gemini) whose wire body
    /// cannot be expressed as the unified struct — when present, egress
    /// sends this instead of serializing `unified`.
    pub raw_body: Option<Value>,
    /// When true, egress does not set the default `Authorization: Bearer`
    /// header — set by transformers whose provider authenticates some
    /// other way (Gemini's `x-goog-api-key`).
    pub suppress_default_auth: bool,
}

impl TransformConfig {
    pub fn merge(mut self, other: TransformConfig) -> Self {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.raw_body.is_some() {
            self.raw_body = other.raw_body;
        }
        self.suppress_default_auth = self.suppress_default_auth || other.suppress_default_auth;
        self.headers.extend(other.headers);
        self
    }
}

/// Body flowing through the egress call and the response-out chain:
/// buffered JSON, or a stream of upstream chunks.
pub enum ResponseBody {
    Buffered(Value),
    Stream(ChunkStream),
}

pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl RawResponse {
    pub fn buffered(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Buffered(body),
        }
    }
}

/// The endpoint-dialect body finally written to the client.
pub enum ClientBody {
    Json(Value),
    Sse(SseStream),
}

pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ClientBody,
}

impl ClientResponse {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ClientBody::Json(body),
        }
    }
}

/// The four-hook capability set. All hooks default to identity; a concrete
/// transformer implements only the ones it needs.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    /// Path the dispatcher should bind a POST route to, if this transformer
    /// is meant to be used as an endpoint.
    fn end_point(&self) -> Option<&str> {
        None
    }

    /// Endpoint hook: raw client-dialect body -> unified request.
    ///
    /// Default assumes the body is already unified-shaped (true for the
    /// OpenAI dialect, since the unified wire is an OpenAI-shaped superset).
    fn transform_request_out(&self, body: Value) -> Result<(UnifiedRequest, TransformConfig)> {
        let unified = serde_json::from_value(body)?;
        Ok((unified, TransformConfig::default()))
    }

    /// Provider/model-chain hook: mutate the unified request before egress.
    fn transform_request_in(
        &self,
        unified: UnifiedRequest,
        provider: &ProviderRecord,
    ) -> Result<(UnifiedRequest, TransformConfig)> {
        let _ = provider;
        Ok((unified, TransformConfig::default()))
    }

    /// Provider/model-chain hook: rewrite the raw upstream response before
    /// the endpoint's `response_in` renders it to the client.
    ///
    /// Takes `response` in place rather than by value: a failing hook must
    /// be logged and skipped, leaving the pipeline able to continue with
    /// the unmodified response, which a by-value signature can't guarantee
    /// once the hook has taken ownership.
    async fn transform_response_out(&self, response: &mut RawResponse) -> Result<()> {
        let _ = response;
        Ok(())
    }

    /// Endpoint hook: render the (by now OpenAI-shaped) response into the
    /// endpoint's dialect.
    async fn transform_response_in(&self, response: RawResponse) -> Result<ClientResponse> {
        match response.body {
            ResponseBody::Buffered(body) => Ok(ClientResponse {
                status: response.status,
                headers: response.headers,
                body: ClientBody::Json(body),
            }),
            ResponseBody::Stream(stream) => {
                use futures::StreamExt;
                let sse = stream.map(|item| {
                    item.map(|chunk| SseEvent {
                        event: None,
                        data: serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string()),
                    })
                });
                Ok(ClientResponse {
                    status: response.status,
                    headers: response.headers,
                    body: ClientBody::Sse(Box::pin(sse)),
                })
            }
        }
    }
}
