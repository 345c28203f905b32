//! registry-scan-gate - A Docker Registry V2 proxy with a vulnerability scan gate
//!
//! This is the main entry point for the registry-scan-gate application.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info};

use registry_scan_gate::config::Config;
use registry_scan_gate::gate::ScanGate;
use registry_scan_gate::proxy::Forwarder;
use registry_scan_gate::scanner::{ImageScanner, TrivyConfig, TrivyScanner};
use registry_scan_gate::server::{AppState, Server};
use registry_scan_gate::telemetry::init_tracing;

/// registry-scan-gate - A Docker Registry V2 proxy with a vulnerability scan gate
#[derive(Parser, Debug)]
#[command(name = "registry-scan-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "REGISTRY_SCAN_GATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        entrypoints = config.entrypoints.len(),
        "Starting registry-scan-gate"
    );

    let trivy_config = TrivyConfig {
        binary: config.scanner.trivy_path.clone(),
        cache_dir: config.scanner.cache_dir.clone(),
        extra_args: config.scanner.extra_args.clone(),
    };
    let connect_timeout = Duration::from_secs(config.upstream.connect_timeout_secs);

    // One listener per entrypoint; all stop on the same signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut servers = JoinSet::new();

    for entrypoint in &config.entrypoints {
        let forwarder = Arc::new(Forwarder::new(&entrypoint.upstream_url, connect_timeout)?);
        let registry = entrypoint.scan_registry();
        let scanner: Arc<dyn ImageScanner> =
            Arc::new(TrivyScanner::new(trivy_config.clone(), registry.clone()));
        let gate = Arc::new(ScanGate::new(Arc::clone(&forwarder), scanner));

        let server = Server::new(entrypoint.clone(), AppState { forwarder, gate });
        let listener = server.bind().await?;

        info!(
            entrypoint = %entrypoint.name,
            address = %entrypoint.address,
            upstream = %entrypoint.upstream_url,
            registry = %registry,
            "Entrypoint configured"
        );

        let mut shutdown_rx = shutdown_tx.subscribe();
        servers.spawn(server.serve(listener, async move {
            let _ = shutdown_rx.recv().await;
        }));
    }

    let mut result = Ok(());
    tokio::select! {
        _ = shutdown_signal() => {}
        Some(joined) = servers.join_next() => {
            // A listener stopped on its own; take the others down too.
            result = flatten(joined);
        }
    }

    let _ = shutdown_tx.send(());
    while let Some(joined) = servers.join_next().await {
        if let Err(e) = flatten(joined) {
            error!(error = %e, "Server stopped with error");
            if result.is_ok() {
                result = Err(e);
            }
        }
    }

    info!("registry-scan-gate shutdown complete");
    result
}

fn flatten(
    joined: Result<Result<(), registry_scan_gate::server::ServerError>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    joined??;
    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
