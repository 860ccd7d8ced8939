use std::path::PathBuf;

use crate::{Config, ConfigError};

const CONFIG_DIR_NAME: &str = ".llm-gateway";
const CONFIG_FILE_NAME: &str = "config.json";

/// Default config path: `~/.llm-gateway/config.json`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .ok_or(ConfigError::NoHomeDirectory)?;

    Ok(PathBuf::from(home).join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load and parse the config file at `path`.
pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    load_from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse config from an in-memory JSON string (used by tests and by callers
/// that already have the file contents).
pub fn load_from_str(raw: &str) -> Result<Config, serde_json::Error> {
    let mut config: Config = serde_json::from_str(raw)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// `SERVICE_PORT` overrides whatever `PORT` the config file set.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(port) = std::env::var("SERVICE_PORT") {
        if let Ok(port) = port.parse() {
            config.port = Some(port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parses_minimal_config() {
        let config = load_from_str(indoc! {r#"
            {
                "APIKEY": "secret",
                "PORT": 4000,
                "Providers": [
                    {
                        "name": "openai-main",
                        "base_url": "https://api.openai.com/v1/chat/completions",
                        "api_key": "sk-test",
                        "models": ["gpt-4o", "gpt-4o-mini"]
                    }
                ],
                "Router": {
                    "default": "openai-main,gpt-4o-mini",
                    "longContext": "openai-main,gpt-4o"
                }
            }
        "#})
        .expect("valid config");

        assert_eq!(config.port(), 4000);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.router.default.as_deref(), Some("openai-main,gpt-4o-mini"));
    }

    #[test]
    fn forces_loopback_without_api_key() {
        let config = load_from_str(r#"{"HOST": "0.0.0.0"}"#).expect("valid config");
        assert_eq!(config.bind_host(), "127.0.0.1");
    }

    #[test]
    fn honors_host_when_api_key_present() {
        let config = load_from_str(r#"{"HOST": "0.0.0.0", "APIKEY": "k"}"#).expect("valid config");
        assert_eq!(config.bind_host(), "0.0.0.0");
    }
}
