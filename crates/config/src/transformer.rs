use serde::Deserialize;
use serde_json::Value;

/// One entry in a transformer `use` chain.
///
/// Either a bare name (instantiated with no options) or a `[name, options]`
/// pair. Untagged so both JSON shapes from the config file deserialize into
/// the same Rust type without a custom visitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransformerSpec {
    /// `"maxtoken"` — instantiate with default options.
    Name(String),
    /// `["maxtoken", {"max_tokens": 8192}]` — instantiate with options.
    NameWithOptions((String, Value)),
}

impl TransformerSpec {
    /// The transformer name, regardless of which shape was used.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::NameWithOptions((name, _)) => name,
        }
    }

    /// The options value, if any was given.
    pub fn options(&self) -> Option<&Value> {
        match self {
            Self::Name(_) => None,
            Self::NameWithOptions((_, options)) => Some(options),
        }
    }
}

/// A config entry under the top-level `transformers` array.
///
/// These describe dynamically loaded transformer modules in the reference
/// implementation (a JS file path plus options). A compiled Rust binary has
/// no equivalent loading mechanism, so the registry parses these for
/// forward-compatibility but never instantiates them.
#[derive(Debug, Clone, Deserialize)]
pub struct DynamicTransformerConfig {
    /// Path to the module, as configured. Unused at runtime.
    pub path: String,
    /// Options blob passed to the module's constructor. Unused at runtime.
    #[serde(default)]
    pub options: Option<Value>,
}
