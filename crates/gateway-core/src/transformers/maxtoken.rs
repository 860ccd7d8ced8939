//! `maxtoken` utility transformer: clamps `max_tokens` to a
//! ceiling configured via the chain entry's options (`{"max_tokens": N}`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::registry::{ProviderRecord, TransformerFactory};
use crate::transform::{TransformConfig, Transformer};
use crate::unified::UnifiedRequest;

const DEFAULT_LIMIT: u32 = 4096;

#[derive(Debug)]
pub struct MaxToken {
    limit: u32,
}

impl MaxToken {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl Transformer for MaxToken {
    fn name(&self) -> &str {
        "maxtoken"
    }

    fn transform_request_in(
        &self,
        mut unified: UnifiedRequest,
        provider: &ProviderRecord,
    ) -> Result<(UnifiedRequest, TransformConfig)> {
        let _ = provider;
        if unified.max_tokens.is_some_and(|tokens| tokens > self.limit) {
            unified.max_tokens = Some(self.limit);
        }
        Ok((unified, TransformConfig::default()))
    }
}

pub fn factory() -> TransformerFactory {
    Arc::new(|options: Option<&Value>| {
        let limit = options
            .and_then(|opts| opts.get("max_tokens"))
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_LIMIT);
        Ok(Arc::new(MaxToken::new(limit)) as Arc<dyn Transformer>)
    })
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
            name: "p".to_string(),
            api_base_url: Url::parse("https://example.com").unwrap(),
            api_key: SecretString::from("key"),
            models: vec!["m".to_string()],
            transformers: ProviderTransformers::default(),
            enabled: true,
        }
    }

    fn request(max_tokens: Option<u32>) -> UnifiedRequest {
        UnifiedRequest {
            model: "m".to_string(),
            messages: vec![UnifiedMessage::text(UnifiedRole::User, "hi")],
            max_tokens,
            temperature: None,
            stream: None,
            tools: None,
            tool_choice: None,
            thinking: None,
        }
    }

    #[test]
    fn clamps_values_above_the_limit() {
        let transformer = MaxToken::new(100);
        let (unified, _) = transformer.transform_request_in(request(Some(500)), &provider()).unwrap();
        assert_eq!(unified.max_tokens, Some(100));
    }

    #[test]
    fn leaves_values_at_or_below_the_limit_untouched() {
        let transformer = MaxToken::new(100);
        let (unified, _) = transformer.transform_request_in(request(Some(50)), &provider()).unwrap();
        assert_eq!(unified.max_tokens, Some(50));
    }

    #[test]
    fn factory_reads_max_tokens_from_options() {
        let factory = factory();
        let transformer = factory(Some(&serde_json::json!({"max_tokens": 16}))).unwrap();
        let (unified, _) = transformer.transform_request_in(request(Some(1000)), &provider()).unwrap();
        assert_eq!(unified.max_tokens, Some(16));
    }
}
