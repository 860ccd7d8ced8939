use serde::Deserialize;

/// Static routing targets consulted by the token-aware router.
///
/// Each field is a `"provider,model"` string, or absent. Rule evaluation
/// order (first match wins) lives in `gateway-core`'s router module; this
/// type only carries the configured targets.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RouterConfig {
    /// Fallback target used when no other rule matches.
    #[serde(default)]
    pub default: Option<String>,
    /// Used when the request's token count exceeds 60,000.
    #[serde(default, rename = "longContext")]
    pub long_context: Option<String>,
    /// Used when the model begins with `claude-3-5-haiku`.
    #[serde(default)]
    pub background: Option<String>,
    /// Used when the request carries a truthy `thinking` field.
    #[serde(default)]
    pub think: Option<String>,
}
