//! HTTP egress to upstream providers (component D).

use std::time::Duration;

use http::{HeaderMap, HeaderValue, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use url::Url;

use crate::error::{GatewayError, Result};
use crate::registry::ProviderRecord;
use crate::transform::{RawResponse, ResponseBody, TransformConfig};

/// Upstream reads can legitimately run long on a slow reasoning model;
/// connects should fail fast.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared `reqwest::Client`, honoring `HTTPS_PROXY`/`PROXY_URL`
/// from the top-level config.
pub fn build_client(proxy: Option<&Url>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_READ_TIMEOUT);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url.as_str())
            .map_err(|err| GatewayError::Internal(anyhow::anyhow!(err)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|err| GatewayError::Internal(anyhow::anyhow!(err)))
}

/// Send `body` to `provider`, honoring any `TransformConfig` overrides a
/// transformer's request hooks produced (custom URL, extra headers, a
/// tighter timeout).
pub async fn send(
    client: &reqwest::Client,
    provider: &ProviderRecord,
    body: Value,
    streaming: bool,
    ctx: &TransformConfig,
    api_key_override: Option<&secrecy::SecretString>,
) -> Result<RawResponse> {
    let url = ctx
        .url
        .clone()
        .unwrap_or_else(|| provider.api_base_url.clone());

    let api_key = api_key_override.unwrap_or(&provider.api_key);

    let mut headers = HeaderMap::new();
    if !ctx.suppress_default_auth {
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|err| GatewayError::Internal(anyhow::anyhow!(err)))?,
        );
    }
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.extend(ctx.headers.clone());

    let mut request = client.post(url).headers(headers).json(&body);

    if let Some(timeout) = ctx.timeout {
        request = request.timeout(timeout);
    }

    let response = request
        .send()
        .await
        .map_err(|err| {
            if err.is_timeout() {
                GatewayError::ProviderTimeout
            } else {
                GatewayError::ProviderConnectionError(err.to_string())
            }
        })?;

    let status = response.status();
    let headers = response.headers().clone();

    if streaming && status == StatusCode::OK {
        let byte_stream = response.bytes_stream();
        let chunk_stream = crate::sse::decode_json_sse(byte_stream);
        return Ok(RawResponse {
            status,
            headers,
            body: ResponseBody::Stream(Box::pin(chunk_stream)),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| GatewayError::ProviderConnectionError(err.to_string()))?;

    let value: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Ok(RawResponse {
        status,
        headers,
        body: ResponseBody::Buffered(value),
    })
}
