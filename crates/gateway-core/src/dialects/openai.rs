//! The OpenAI Chat Completions dialect.
//!
//! The unified wire is an OpenAI-shaped superset, so both hooks are
//! identity — the default trait implementations already do the right
//! thing, this type only exists to carry the `end_point`.

use async_trait::async_trait;

use crate::transform::Transformer;

#[derive(Debug, Default)]
pub struct OpenAi;

#[async_trait]
impl Transformer for OpenAi {
    fn name(&self) -> &str {
        "openai"
    }

    fn end_point(&self) -> Option<&str> {
        Some("/v1/chat/completions")
    }
}
