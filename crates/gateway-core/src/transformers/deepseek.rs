//! `deepseek` utility transformer: clamps `max_tokens` to the
//! provider's hard ceiling and folds `reasoning_content` stream deltas into
//! `thinking` deltas via the shared [`super::reasoning`] rewrite.

use async_trait::async_trait;

use super::reasoning;
use crate::error::Result;
use crate::registry::ProviderRecord;
use crate::transform::{RawResponse, ResponseBody, TransformConfig, Transformer};
use crate::unified::UnifiedRequest;

const MAX_TOKENS: u32 = 8192;

#[derive(Debug, Default)]
pub struct DeepSeek;

#[async_trait]
impl Transformer for DeepSeek {
    fn name(&self) -> &str {
        "deepseek"
    }

    fn transform_request_in(
        &self,
        mut unified: UnifiedRequest,
        provider: &ProviderRecord,
    ) -> Result<(UnifiedRequest, TransformConfig)> {
        let _ = provider;
        if unified.max_tokens.is_some_and(|tokens| tokens > MAX_TOKENS) {
            unified.max_tokens = Some(MAX_TOKENS);
        }
        Ok((unified, TransformConfig::default()))
    }

    async fn transform_response_out(&self, response: &mut RawResponse) -> Result<()> {
        if let ResponseBody::Stream(stream) = &mut response.body {
            let owned = std::mem::replace(stream, Box::pin(futures::stream::empty()));
            *stream = reasoning::rewrite_stream(owned, "reasoning_content");
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
    use url::Url;

    fn provider() -> ProviderRecord {
        ProviderRecord {
            name: "deepseek".to_string(),
            api_base_url: Url::parse("https://api.deepseek.com").unwrap(),
            api_key: SecretString::from("key"),
            models: vec!["deepseek-reasoner".to_string()],
            transformers: ProviderTransformers::default(),
            enabled: true,
        }
    }

    #[test]
    fn clamps_above_8192() {
        let unified = UnifiedRequest {
            model: "deepseek-reasoner".to_string(),
            messages: vec![UnifiedMessage::text(UnifiedRole::User, "hi")],
            max_tokens: Some(32_000),
            temperature: None,
            stream: None,
            tools: None,
            tool_choice: None,
            thinking: None,
        };
        let (unified, _) = DeepSeek.transform_request_in(unified, &provider()).unwrap();
        assert_eq!(unified.max_tokens, Some(8192));
    }
}
