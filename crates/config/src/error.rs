use std::path::PathBuf;

/// Errors that can occur while locating or parsing the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not determine the user-home config path (no `HOME`/`USERPROFILE`).
    #[error("could not determine the user home directory")]
    NoHomeDirectory,

    /// The config file could not be read from disk.
    #[error("failed to read config file at {path}: {source}")]
    Read {
        /// Path we attempted to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file contents were not valid JSON for this schema.
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        /// Path we attempted to parse.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
