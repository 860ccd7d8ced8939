//! The Gemini dialect. Unlike OpenAI/Anthropic, Gemini is a
//! *provider*-side transformer: it has no client-facing `end_point` that
//! accepts unified requests directly — the path
//! `/v1beta/models/:modelAndAction` is a pass-through parameterised route,
//! wired into the dispatcher's wildcard fallback rather than an exact
//! route (see the dispatcher's prefix-match fallback).

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use super::gemini_convert;
use crate::error::Result;
use crate::registry::ProviderRecord;
use crate::transform::{RawResponse, TransformConfig, Transformer};
use crate::unified::UnifiedRequest;

#[derive(Debug, Default)]
pub struct Gemini;

#[async_trait]
impl Transformer for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    fn end_point(&self) -> Option<&str> {
        Some("/v1beta/models/:modelAndAction")
    }

    fn transform_request_in(
        &self,
        unified: UnifiedRequest,
        provider: &ProviderRecord,
    ) -> Result<(UnifiedRequest, TransformConfig)> {
        let streaming = unified.is_streaming();
        let raw_body = gemini_convert::unified_to_gemini_request(&unified);

        let action = if streaming {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let url = provider
            .api_base_url
            .join(&format!("./{}:{action}", unified.model))
            .unwrap_or_else(|_| provider.api_base_url.clone());

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(provider.api_key.expose_secret()) {
            headers.insert("x-goog-api-key", value);
        }

        let ctx = TransformConfig {
            url: Some(url),
            headers,
            timeout: None,
            raw_body: Some(raw_body),
            suppress_default_auth: true,
        };

        Ok((unified, ctx))
    }

    async fn transform_response_out(&self, response: &mut RawResponse) -> Result<()> {
        gemini_convert::convert_response_out(response)
    }
}
