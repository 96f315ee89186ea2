//! # Local static-file server
//!
//! Thin collaborator binary around the control API: loads configuration from
//! the environment, prints every access-log record to stdout, and runs the
//! server until interrupted.

use dirserve::{config, ServerLifecycleController};
use tokio::signal;
use tracing::{error, info};

/// Entry point for the server binary.
///
/// Initializes logging, loads configuration from the environment, starts the
/// server, and stops it again on ctrl-c.
///
/// # Errors
/// Returns an error if configuration validation fails or if the server fails
/// to bind to its port.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::ServerConfig::from_env()?;
    config.validate()?;

    let controller = ServerLifecycleController::new();
    controller.register_log_sink(|record| println!("{record}"));
    controller.start(config.root_directory.clone(), config.port)?;

    shutdown_signal().await;
    info!("shutting down");
    if let Err(e) = controller.stop() {
        error!("stop failed: {e}");
    }

    Ok(())
}

/// Listens for a shutdown signal (Ctrl+C) and initiates a graceful shutdown.
async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
}
