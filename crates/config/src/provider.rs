use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::transformer::TransformerSpec;

/// A single configured upstream provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, used as the left-hand side of `provider,model`.
    pub name: String,
    /// Base URL the provider's native dialect is served from.
    #[serde(rename = "base_url")]
    pub api_base_url: Url,
    /// Credential sent as `Authorization: Bearer <api_key>` by default.
    pub api_key: SecretString,
    /// Model identifiers this provider serves.
    #[serde(default)]
    pub models: Vec<String>,
    /// Transformer chains bound to this provider (provider-wide and per-model).
    #[serde(default)]
    pub transformer: Option<ProviderTransformerConfig>,
}

/// The `transformer` object attached to a provider config entry.
///
/// Its `use` key is the provider-wide chain; every other key names a model
/// and carries that model's own `{use: [...]}` chain.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderTransformerConfig {
    /// Provider-wide chain, applied to every model this provider serves.
    #[serde(rename = "use", default)]
    pub use_chain: Vec<TransformerSpec>,
    /// Per-model chains, keyed by model id.
    #[serde(flatten)]
    pub per_model: IndexMap<String, ModelTransformerConfig>,
}

/// A per-model `{use: [...]}` transformer chain.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModelTransformerConfig {
    /// Transformer chain applied only when this specific model is targeted.
    #[serde(rename = "use", default)]
    pub use_chain: Vec<TransformerSpec>,
}
