//! `openrouter` utility transformer: the same reasoning→thinking
//! rewrite as [`super::deepseek`] but over the `reasoning` field, plus
//! stripping `cache_control` from non-Claude requests (OpenRouter rejects
//! Anthropic cache hints on other backends).

use async_trait::async_trait;

use super::reasoning;
use crate::error::Result;
use crate::registry::ProviderRecord;
use crate::transform::{RawResponse, ResponseBody, TransformConfig, Transformer};
use crate::unified::UnifiedRequest;

#[derive(Debug, Default)]
pub struct OpenRouter;

#[async_trait]
impl Transformer for OpenRouter {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn transform_request_in(
        &self,
        mut unified: UnifiedRequest,
        provider: &ProviderRecord,
    ) -> Result<(UnifiedRequest, TransformConfig)> {
        let _ = provider;
        if !unified.model.starts_with("claude") {
            for message in &mut unified.messages {
                message.cache_control = None;
            }
        }
        Ok((unified, TransformConfig::default()))
    }

    async fn transform_response_out(&self, response: &mut RawResponse) -> Result<()> {
        if let ResponseBody::Stream(stream) = &mut response.body {
            let owned = std::mem::replace(stream, Box::pin(futures::stream::empty()));
            *stream = reasoning::rewrite_stream(owned, "reasoning");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderTransformers;
    use crate::unified::{UnifiedMessage, UnifiedRole};
    use secrecy::SecretString;
    use serde_json::json;
    use url::Url;

    fn provider() -> ProviderRecord {
        ProviderRecord {
            name: "openrouter".to_string(),
            api_base_url: Url::parse("https://openrouter.ai/api/v1").unwrap(),
            api_key: SecretString::from("key"),
            models: vec!["gpt-4o".to_string()],
            transformers: ProviderTransformers::default(),
            enabled: true,
        }
    }

    fn request(model: &str) -> UnifiedRequest {
        let mut message = UnifiedMessage::text(UnifiedRole::User, "hi");
        message.cache_control = Some(json!({"type": "ephemeral"}));
        UnifiedRequest {
            model: model.to_string(),
            messages: vec![message],
            max_tokens: None,
            temperature: None,
            stream: None,
            tools: None,
            tool_choice: None,
            thinking: None,
        }
    }

    #[test]
    fn strips_cache_control_for_non_claude_models() {
        let (unified, _) = OpenRouter.transform_request_in(request("gpt-4o"), &provider()).unwrap();
        assert!(unified.messages[0].cache_control.is_none());
    }

    #[test]
    fn preserves_cache_control_for_claude_models() {
        let (unified, _) = OpenRouter
            .transform_request_in(request("claude-3-5-sonnet"), &provider())
            .unwrap();
        assert!(unified.messages[0].cache_control.is_some());
    }
}
