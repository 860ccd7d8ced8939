//! The gateway's core library: provider/transformer registries, the
//! pipeline engine, dialect and utility transformers, and the axum app
//! built from them. The `gateway` binary crate only parses args, loads
//! config, and calls [`build`].

pub mod admin;
pub mod auth;
pub mod dialects;
pub mod dispatch;
pub mod egress;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod router_selection;
pub mod sse;
pub mod state;
pub mod token_counter;
pub mod transform;
pub mod transformers;
pub mod unified;

use std::sync::Arc;

use config::Config;

use crate::registry::{ProviderRecord, ProviderRegistry, TransformerRegistry};
use crate::state::AppState;
use crate::transform::Transformer;

/// Register every transformer this gateway ships: the three dialects (the
/// endpoint-bearing ones the dispatcher binds routes to) and the five
/// utility transformers (`use`-chain only, no `end_point`).
pub fn default_transformer_registry() -> TransformerRegistry {
    let registry = TransformerRegistry::new();

    register_zero_arg(&registry, "openai", || Arc::new(dialects::openai::OpenAi));
    register_zero_arg(&registry, "anthropic", || Arc::new(dialects::anthropic::Anthropic));
    register_zero_arg(&registry, "gemini", || Arc::new(dialects::gemini::Gemini));
    register_zero_arg(&registry, "deepseek", || Arc::new(transformers::deepseek::DeepSeek));
    register_zero_arg(&registry, "openrouter", || Arc::new(transformers::openrouter::OpenRouter));
    register_zero_arg(&registry, "groq", || Arc::new(transformers::groq::Groq));
    register_zero_arg(&registry, "tooluse", || Arc::new(transformers::tooluse::ToolUse));
    registry.register("maxtoken", transformers::maxtoken::factory());

    registry
}

fn register_zero_arg<T>(registry: &TransformerRegistry, name: &str, make: impl Fn() -> Arc<T> + Send + Sync + 'static)
where
    T: Transformer + 'static,
{
    registry.register(
        name,
        Arc::new(move |_options: Option<&serde_json::Value>| Ok(make() as Arc<dyn Transformer>)),
    );
}

/// Build the shared [`ProviderRegistry`] from `config`, resolving every
/// provider's `use` chains against `transformers`. A provider whose config
/// fails to resolve a transformer name logs and skips that entry rather
/// than aborting startup.
pub fn provider_registry_from_config(config: &Config, transformers: &TransformerRegistry) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    for provider_config in &config.providers {
        let record = ProviderRecord::from_config(provider_config, transformers);
        if let Err(err) = registry.register(record) {
            log::warn!("skipping provider '{}': {err}", provider_config.name);
        }
    }
    registry
}

/// Assemble [`AppState`] and the axum [`axum::Router`] from a loaded config.
pub fn build(config: Config) -> anyhow::Result<axum::Router> {
    let transformers = default_transformer_registry();
    let providers = provider_registry_from_config(&config, &transformers);
    let http_client = egress::build_client(config.https_proxy.as_ref())?;

    let state = AppState::new(config, providers, transformers, http_client);
    Ok(dispatch::build_router(state))
}
