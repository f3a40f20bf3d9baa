//! `mem-search-service` binary — thin CLI shell over the [`mem_search_service`] library crate.

use std::sync::Arc;

use clap::Parser;
use mem_search_service::{Cli, DaemonConfig, RepoRegistry};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match DaemonConfig::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .with_target(false)
        .init();

    tracing::info!(
        request_socket = %config.request_socket.display(),
        max_results = config.max_results,
        coalesce_ms = config.coalesce.as_millis(),
        "starting mem-search-service"
    );

    let config = Arc::new(config);
    let registry = Arc::new(RepoRegistry::new(config.max_file_bytes, config.coalesce));
    let request_socket = config.request_socket.clone();

    tokio::select! {
        result = mem_search_service::ipc::run(Arc::clone(&config), registry) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "request socket accept loop failed");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = std::fs::remove_file(&request_socket);
}

/// Waits for either Ctrl-C or SIGTERM, whichever arrives first — the same dual-signal shape
/// the teacher's HTTP server shuts down on.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
