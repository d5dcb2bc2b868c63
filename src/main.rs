//! framegate - multi-protocol TCP frame decoding and dispatch server.
//!
//! Accepts long-lived TCP connections and carves each byte stream into
//! complete messages under one of five framing regimes, or detects the
//! protocol automatically at connection start.

use framegate_server::{Config, Server};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if FRAMEGATE_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("FRAMEGATE_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting framegate server");
    tracing::info!("  Port: {}", config.tcp.port);
    tracing::info!("  Framing: {:?}", config.tcp.framing);
    tracing::info!("  Max frame length: {} bytes", config.tcp.max_frame_length);
    match config.tcp.reader_idle() {
        Some(idle) => tracing::info!("  Reader idle timeout: {:?}", idle),
        None => tracing::info!("  Reader idle timeout: disabled"),
    }
    tracing::info!(
        "  Responses: {}",
        if config.tcp.respond_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    // Bind failure propagates as a non-zero exit code.
    let server = Arc::new(Server::bind(config.tcp).await?);

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
