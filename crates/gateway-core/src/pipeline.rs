//! The pipeline engine (component F).
//!
//! Runs the ordered chain for a single request: endpoint `request_out` →
//! provider/model `request_in` → egress → provider/model `response_out` →
//! endpoint `response_in`. Provider and per-model `use` chains share the
//! same ordering both directions, so [`ProviderTransformers::chain_for`]
//! is consulted once per direction rather than twice with different logic.

use serde_json::Value;

use crate::egress;
use crate::error::Result;
use crate::registry::ProviderRecord;
use crate::state::AppState;
use crate::transform::{ClientBody, ClientResponse, RawResponse, ResponseBody, Transformer};

pub async fn run(
    state: &AppState,
    endpoint: &dyn Transformer,
    provider: &ProviderRecord,
    body: Value,
    api_key_override: Option<&secrecy::SecretString>,
) -> Result<ClientResponse> {
    let (mut unified, mut ctx) = endpoint.transform_request_out(body)?;

    for transformer in provider.transformers.chain_for(&unified.model) {
        match transformer.transform_request_in(unified.clone(), provider) {
            Ok((next_unified, next_ctx)) => {
                unified = next_unified;
                ctx = ctx.merge(next_ctx);
            }
            Err(err) => {
                log::warn!(
                    "transformer '{}' request_in failed, skipping: {err}",
                    transformer.name()
                );
            }
        }
    }

    let streaming = unified.is_streaming();
    let outbound_body = match ctx.raw_body.take() {
        Some(body) => body,
        None => serde_json::to_value(&unified)?,
    };
    let mut raw = egress::send(
        &state.http_client,
        provider,
        outbound_body,
        streaming,
        &ctx,
        api_key_override,
    )
    .await?;

    if !raw.status.is_success() {
        return Ok(forward_verbatim(raw));
    }

    for transformer in provider.transformers.chain_for(&unified.model) {
        if let Err(err) = transformer.transform_response_out(&mut raw).await {
            log::warn!(
                "transformer '{}' response_out failed, skipping: {err}",
                transformer.name()
            );
        }
    }

    endpoint.transform_response_in(raw).await
}

/// Non-2xx upstream responses bypass every response transformer and the
/// endpoint's `response_in` hook — forwarded as-is.
fn forward_verbatim(raw: RawResponse) -> ClientResponse {
    match raw.body {
        ResponseBody::Buffered(body) => ClientResponse {
            status: raw.status,
            headers: raw.headers,
            body: ClientBody::Json(body),
        },
        ResponseBody::Stream(stream) => {
            use futures::StreamExt;
            let sse = stream.map(|item| {
                item.map(|chunk| crate::transform::SseEvent {
                    event: None,
                    data: serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string()),
                })
            });
            ClientResponse {
                status: raw.status,
                headers: raw.headers,
                body: ClientBody::Sse(Box::pin(sse)),
            }
        }
    }
}

/// End-to-end pipeline tests against a tiny local axum server standing in
/// for an upstream provider — no external network access, same `axum::serve`
/// pattern the `gateway` binary itself uses.
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Json, Router, http::StatusCode as AxumStatusCode, routing::post};
    use http::StatusCode;
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use url::Url;

    use super::*;
    use crate::dialects::openai::OpenAi;
    use crate::registry::{ProviderRecord, ProviderRegistry, ProviderTransformers, TransformerRegistry};
    use crate::transform::TransformConfig;
    use crate::unified::UnifiedRequest;

    /// Tags its own name onto the unified request's `thinking` slot (request
    /// direction) and onto the buffered response's `_order` array (response
    /// direction) — a deterministic way to observe chain ordering without
    /// reaching into `Transformer` internals.
    #[derive(Debug)]
    struct OrderTransformer {
        tag: &'static str,
    }

    #[async_trait::async_trait]
    impl Transformer for OrderTransformer {
        fn name(&self) -> &str {
            self.tag
        }

        fn transform_request_in(
            &self,
            mut unified: UnifiedRequest,
            provider: &ProviderRecord,
        ) -> crate::error::Result<(UnifiedRequest, TransformConfig)> {
            let _ = provider;
            let mut trace = unified
                .thinking
                .as_ref()
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            trace.push(Value::String(self.tag.to_string()));
            unified.thinking = Some(Value::Array(trace));
            Ok((unified, TransformConfig::default()))
        }

        async fn transform_response_out(&self, response: &mut RawResponse) -> crate::error::Result<()> {
            if let ResponseBody::Buffered(value) = &mut response.body {
                if let Some(obj) = value.as_object_mut() {
                    let entry = obj.entry("_order".to_string()).or_insert_with(|| json!([]));
                    if let Some(array) = entry.as_array_mut() {
                        array.push(Value::String(self.tag.to_string()));
                    }
                }
            }
            Ok(())
        }
    }

    fn provider_with_chain(base_url: &str, chain: Vec<Arc<dyn Transformer>>) -> ProviderRecord {
        ProviderRecord {
            name: "mock".to_string(),
            api_base_url: Url::parse(base_url).unwrap(),
            api_key: SecretString::from("key".to_string()),
            models: vec!["m".to_string()],
            transformers: ProviderTransformers {
                use_chain: chain,
                per_model: Default::default(),
            },
            enabled: true,
        }
    }

    async fn test_state() -> AppState {
        let config = config::load_from_str("{}").unwrap();
        let http_client = egress::build_client(None).unwrap();
        AppState::new(config, ProviderRegistry::new(), TransformerRegistry::new(), http_client)
    }

    /// Binds a one-shot local server that echoes the JSON body it receives,
    /// returning its base URL (`http://127.0.0.1:<port>/`).
    async fn spawn_echo_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", post(|Json(body): Json<Value>| async move { Json(body) }));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/")
    }

    /// Binds a one-shot local server that always answers 500 with a fixed body.
    async fn spawn_failing_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/",
            post(|| async { (AxumStatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))) }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn request_and_response_chains_run_in_registration_order() {
        let base_url = spawn_echo_server().await;
        let chain: Vec<Arc<dyn Transformer>> = vec![
            Arc::new(OrderTransformer { tag: "a" }),
            Arc::new(OrderTransformer { tag: "b" }),
        ];
        let provider = provider_with_chain(&base_url, chain);
        let state = test_state().await;
        let endpoint = OpenAi;

        let body = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]});
        let response = run(&state, &endpoint, &provider, body, None).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let ClientBody::Json(response_body) = response.body else {
            panic!("expected a buffered JSON response");
        };

        // The echo server hands back exactly what egress sent, so
        // `thinking` shows the request_in chain's order.
        assert_eq!(response_body["thinking"], json!(["a", "b"]));
        // `_order` is appended by the response_out chain afterward, in the
        // same registration order (see DESIGN.md's pipeline ordering note).
        assert_eq!(response_body["_order"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn non_2xx_upstream_response_bypasses_every_transformer() {
        let base_url = spawn_failing_server().await;
        let chain: Vec<Arc<dyn Transformer>> = vec![Arc::new(OrderTransformer { tag: "a" })];
        let provider = provider_with_chain(&base_url, chain);
        let state = test_state().await;
        let endpoint = OpenAi;

        let body = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]});
        let response = run(&state, &endpoint, &provider, body, None).await.unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let ClientBody::Json(response_body) = response.body else {
            panic!("expected a buffered JSON response");
        };
        assert_eq!(response_body, json!({"error": "boom"}));
    }
}
