//! visor server binary.
//!
//! Permission-filtered resource listing over a relation-based permission store.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! visor --config config.yaml
//!
//! # With environment variables only
//! VISOR_STORAGE__BACKEND=memory visor
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use visor_api::http::routes::RouterOptions;
use visor_api::http::{create_router_with_observability, AppState};
use visor_api::observability::{init_logging, init_metrics, LoggingConfig, MetricsState};
use visor_domain::dispatcher::Dispatcher;
use visor_server::{auth, ServerConfig};
use visor_storage::{MemoryPermissionStore, OpenFgaConfig, OpenFgaStore, PermissionStore};

/// visor - permission-filtered resource listing
#[derive(Parser, Debug)]
#[command(name = "visor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from(&config.logging));
    info!(version = env!("CARGO_PKG_VERSION"), "Starting visor");

    let metrics_state = init_metrics()?;
    if config.metrics.enabled {
        info!(path = %config.metrics.path, "Metrics enabled");
    }

    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory permission store");
            run_server(MemoryPermissionStore::new_shared(), &config, metrics_state).await
        }
        "openfga" => {
            let api_url = config
                .storage
                .api_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("storage.api_url is required for openfga"))?;
            let store_id = config
                .storage
                .store_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("storage.store_id is required for openfga"))?;

            let mut openfga = OpenFgaConfig::new(api_url, store_id);
            openfga.authorization_model_id = config.storage.authorization_model_id.clone();
            openfga.api_token = config.storage.api_token.clone();
            openfga.timeout = Duration::from_secs(config.storage.timeout_secs);

            let storage = OpenFgaStore::new(openfga)?;
            if let Err(e) = storage.health_check().await {
                // Readiness reports this until the store comes up.
                error!("Permission store not reachable at startup: {}", e);
            }
            run_server(Arc::new(storage), &config, metrics_state).await
        }
        other => anyhow::bail!("Unknown storage backend: {other}"),
    }
}

async fn run_server<S: PermissionStore>(
    storage: Arc<S>,
    config: &ServerConfig,
    metrics_state: MetricsState,
) -> anyhow::Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(config.dispatcher_config())?);
    let authenticator = auth::from_settings(&config.auth)?;
    let state = AppState::new(
        storage,
        Arc::clone(&dispatcher),
        config.resolver_config(),
        authenticator,
    );

    let options = RouterOptions {
        metrics_path: config.metrics.path.clone(),
        request_timeout: Some(Duration::from_secs(config.server.request_timeout_secs)),
        ..RouterOptions::default()
    };
    let router = create_router_with_observability(state, metrics_state, options);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("HTTP server stopped, draining dispatcher");
    dispatcher.stop().await;
    info!("Shutdown complete");

    served.map_err(Into::into)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
