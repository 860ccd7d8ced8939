mod args;
mod logger;

use args::Args;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    let loaded = config::load(&config_path);
    let mut cfg = loaded.unwrap_or_else(|err| {
        eprintln!("warning: {err}; starting with an empty configuration");
        config::load_from_str("{}").expect("empty config is valid")
    });

    if let Some(port) = args.port {
        cfg.port = Some(port);
    }

    logger::init(&args.log_filter, cfg.log, cfg.log_file.as_deref());

    log::info!("llm-gateway starting, config loaded from {}", config_path.display());

    let router = gateway_core::build(cfg.clone())?;

    let addr = format!("{}:{}", cfg.bind_host(), cfg.port());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");

    let shutdown = shutdown_signal();

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    log::info!("shutdown complete");
    Ok(())
}

/// Waits for SIGINT (Ctrl-C) or, on unix, SIGTERM so `axum::serve` can drain
/// in-flight requests before exiting. The PID file, if any, is caller-owned.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    log::info!("received shutdown signal, closing listener");
}
