//! On-disk JSON configuration for the gateway.
//!
//! The file lives at a user-home path (see [`default_config_path`]) and is
//! reloaded only at process startup — there is no hot-reload or persistence
//! beyond this single file, by design.

mod error;
mod loader;
mod provider;
mod router;
mod transformer;

pub use error::ConfigError;
pub use loader::{default_config_path, load, load_from_str};
pub use provider::{ModelTransformerConfig, ProviderConfig, ProviderTransformerConfig};
pub use router::RouterConfig;
pub use transformer::{DynamicTransformerConfig, TransformerSpec};

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default bind port when `PORT` is absent from the config file.
pub const DEFAULT_PORT: u16 = 3456;

/// Top-level gateway configuration, deserialized directly from the JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// When true, append log lines to [`Config::log_file`].
    #[serde(default, rename = "LOG")]
    pub log: bool,

    /// Path to the log file. Only consulted when `LOG` is true.
    #[serde(default, rename = "LOG_FILE")]
    pub log_file: Option<std::path::PathBuf>,

    /// Bind address. Forced to loopback when no `APIKEY` is configured,
    /// regardless of what is set here — see [`Config::bind_host`].
    #[serde(default, rename = "HOST")]
    pub host: Option<String>,

    /// Bind port. Defaults to [`DEFAULT_PORT`].
    #[serde(default, rename = "PORT")]
    pub port: Option<u16>,

    /// Shared secret required on every non-health inbound request.
    #[serde(default, rename = "APIKEY")]
    pub api_key: Option<SecretString>,

    /// Upstream HTTPS proxy, applied to every egress call.
    #[serde(default, rename = "HTTPS_PROXY", alias = "PROXY_URL")]
    pub https_proxy: Option<Url>,

    /// Provider records. Both casings are accepted because the corpus this
    /// format was distilled from is inconsistent about it.
    #[serde(default, rename = "Providers", alias = "providers")]
    pub providers: Vec<ProviderConfig>,

    /// Routing targets consulted by the token-aware router.
    #[serde(default, rename = "Router")]
    pub router: RouterConfig,

    /// Dynamically-loaded transformer modules.
    ///
    /// The reference implementation loads these as JS files at runtime; a
    /// compiled Rust binary has no equivalent, so each entry is parsed here
    /// but never instantiated — `gateway_core::provider_registry_from_config`
    /// logs and skips it when building the transformer registry, the same
    /// way it logs and skips any other config entry it cannot resolve.
    #[serde(default)]
    pub transformers: Vec<DynamicTransformerConfig>,
}

impl Config {
    /// Effective bind port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Effective bind host.
    ///
    /// Forced to loopback when no `APIKEY` is set so an unauthenticated
    /// gateway is never reachable from outside the host by accident.
    pub fn bind_host(&self) -> &str {
        if self.api_key.is_some() {
            self.host.as_deref().unwrap_or("0.0.0.0")
        } else {
            "127.0.0.1"
        }
    }
}
