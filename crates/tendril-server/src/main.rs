//! tendril-server - REST API server binary.

use std::net::SocketAddr;

use tendril_core::{EngineConfig, TendrilEngine};
use tendril_server::{create_server, AppState};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Load the engine configuration from `TENDRIL_CONFIG` if set, then apply
/// `TENDRIL_*` overrides.
fn load_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match std::env::var("TENDRIL_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            EngineConfig::from_file(&path)?.with_env()?
        }
        Err(_) => EngineConfig::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing; TENDRIL_LOG_FORMAT=json switches to structured output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tendril_server=debug"));
    let json = std::env::var("TENDRIL_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();

    // Get configuration from environment
    let host = std::env::var("TENDRIL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("TENDRIL_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .map_err(|e| format!("TENDRIL_PORT must be a valid port number: {}", e))?;

    let config = load_config()?;
    let engine = TendrilEngine::new(config)?;

    // Start feed polling and preservation delivery
    let services = engine.start_services().await?;
    info!("Background services started (feeds + preservation)");

    let state = AppState::new(engine);
    let app = create_server(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting tendril-server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping services...");
        })
        .await?;

    services.shutdown().await?;

    info!("Server stopped cleanly");
    Ok(())
}
