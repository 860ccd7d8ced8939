//! Endpoint dispatcher (component E) and the provider-selection filter.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::admin;
use crate::auth;
use crate::error::{GatewayError, Result};
use crate::pipeline;
use crate::router_selection::select_route;
use crate::state::AppState;
use crate::transform::{ClientBody, ClientResponse, Transformer};

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/models", get(crate::models::openai_list_models))
        .route("/v1/messages/models", get(crate::models::anthropic_list_models));

    // Every transformer carrying an `end_point` gets an exact-match POST
    // route closed over it. Registered in `all()` order, which
    // for the dialects this gateway ships is OpenAI, Anthropic, then
    // Gemini's parameterised path (handled as a wildcard below instead of
    // axum path params, since `:modelAndAction` also has to match the
    // `:generateContent` / `:streamGenerateContent` suffix Gemini expects).
    for transformer in state.transformers.with_endpoint() {
        if let Some(endpoint) = transformer.end_point() {
            if endpoint.contains(':') {
                continue;
            }
            let transformer = transformer.clone();
            router = router.route(
                endpoint,
                post(
                    move |state: State<AppState>, headers: axum::http::HeaderMap, body: Bytes| {
                        let transformer = transformer.clone();
                        async move { handle(state, transformer, headers, body).await }
                    },
                ),
            );
        }
    }

    router = router.nest("/providers", admin::router());

    router
        .fallback(wildcard_fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key))
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    Json(json!({"message": "LLMs API", "version": "1.0.0"}))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "timestamp": jiff::Timestamp::now().to_string()}))
}

/// Unmatched POSTs: scan endpoint-bearing transformers for the first whose
/// `end_point` is a prefix of the request path (the resolution chosen —
/// exact match is tried first by the routes above; this is the last-resort
/// prefix scan, chiefly for Gemini's `:generateContent` suffix).
async fn wildcard_fallback(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Response {
    let path = request.uri().path().to_string();

    let matched = state
        .transformers
        .with_endpoint()
        .into_iter()
        .find(|t| t.end_point().is_some_and(|ep| path_matches(ep, &path)));

    let Some(transformer) = matched else {
        return GatewayError::RouteNotFound(path).into_response();
    };

    let headers = request.headers().clone();
    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => return GatewayError::InvalidRequest(err.to_string()).into_response(),
    };

    handle(State(state), transformer, headers, body).await
}

fn path_matches(endpoint: &str, path: &str) -> bool {
    if let Some(prefix) = endpoint.split(':').next() {
        if !prefix.is_empty() {
            return path.starts_with(prefix);
        }
    }
    path.starts_with(endpoint)
}

async fn handle(
    State(state): State<AppState>,
    transformer: Arc<dyn Transformer>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Response {
    match handle_inner(state, transformer, headers, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_inner(
    state: AppState,
    transformer: Arc<dyn Transformer>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let mut json_body: Value = serde_json::from_slice(&body)?;

    let route_key = apply_provider_selection_and_routing(&mut json_body, &state);

    let Some((provider, resolved_model)) = state.providers.resolve(&route_key) else {
        return Err(GatewayError::RouteNotFound(route_key));
    };

    json_body["model"] = Value::String(resolved_model);

    let byok = extract_byok(&headers);
    let client_response = pipeline::run(&state, transformer.as_ref(), &provider, json_body, byok.as_ref()).await?;
    Ok(render(client_response))
}

/// `X-Provider-API-Key` overrides the configured provider key for this one
/// call.
fn extract_byok(headers: &axum::http::HeaderMap) -> Option<secrecy::SecretString> {
    headers
        .get("x-provider-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| secrecy::SecretString::from(v.to_string()))
}

/// Provider-selection filter + router, run on the raw JSON
/// body before any unified typing exists. Returns the string the provider
/// registry should resolve (`provider,model` or bare `model`).
fn apply_provider_selection_and_routing(body: &mut Value, state: &AppState) -> String {
    let model = body.get("model").and_then(Value::as_str).unwrap_or_default().to_string();

    if let Some((provider_name, bare_model)) = model.split_once(',') {
        let provider_name = provider_name.to_string();
        let bare_model = bare_model.to_string();
        body["model"] = Value::String(bare_model.clone());
        return format!("{provider_name},{bare_model}");
    }

    match select_route(body, &state.config.router) {
        Some(target) => {
            body["model"] = Value::String(target.clone());
            target
        }
        None => model,
    }
}

fn render(response: ClientResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in response.headers.iter() {
        builder = builder.header(name, value);
    }

    match response.body {
        ClientBody::Json(body) => {
            let bytes = serde_json::to_vec(&body).unwrap_or_default();
            builder
                .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(axum::body::Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        ClientBody::Sse(stream) => {
            use futures::StreamExt;
            let body_stream = stream.map(|item| match item {
                Ok(event) => {
                    let mut frame = String::new();
                    if let Some(name) = event.event {
                        frame.push_str("event: ");
                        frame.push_str(&name);
                        frame.push('\n');
                    }
                    frame.push_str("data: ");
                    frame.push_str(&event.data);
                    frame.push_str("\n\n");
                    Ok(Bytes::from(frame))
                }
                Err(err) => Err(err),
            });

            builder
                .header(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"))
                .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(header::CONNECTION, HeaderValue::from_static("keep-alive"))
                .body(axum::body::Body::from_stream(body_stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}
