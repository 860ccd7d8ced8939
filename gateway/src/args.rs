//! CLI flags for the `gateway` binary.

use std::path::PathBuf;

use clap::Parser;

/// Multi-provider LLM API gateway.
///
/// Loads the on-disk config, builds the provider/transformer registries and
/// the pipeline engine, and serves the resulting HTTP surface. PID-file and
/// daemon lifecycle bookkeeping is the caller's responsibility, not this
/// binary's.
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about)]
pub struct Args {
    /// Path to the JSON config file. Defaults to `~/.llm-gateway/config.json`.
    #[arg(long, short = 'c', env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind port, overriding both the config file's `PORT` and `SERVICE_PORT`.
    #[arg(long, short = 'p', env = "GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Log filter string, e.g. `info` or `gateway_core=debug,gateway=info`.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_filter: String,
}
