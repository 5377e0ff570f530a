//! # Crashtrack
//!
//! Device-side daemon for a crash-detection service.
//!
//! Samples the device position, reports it to the backend, and renders the
//! backend's latest confirmed reading as a text map frame.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crashtrack::config::Config;
use crashtrack::controller::PermissionState;
use crashtrack::logging::init_logging;
use crashtrack::notify::{log_notification, ChannelNotifier};
use crashtrack::session::Session;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for the Crashtrack daemon
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first CLI argument, or `config/default.toml`)
///    - Set up console and optional file logging
///    - Build the session (credential store, position source, backend)
///
/// 2. **Run**
///    - Request location permission and submit the first sample
///    - Start the sampling and polling loops
///    - Log notifications as they are raised
///
/// 3. **Graceful Shutdown**
///    - On Ctrl+C, stop both loops and exit
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be read or is invalid
/// - The log directory cannot be created
/// - The HTTP client cannot be built
///
/// # Examples
///
/// ```bash
/// crashtrack /etc/crashtrack/config.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("Crashtrack v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_path);

    let (notifier, mut notifications) = ChannelNotifier::new();
    let session = Session::from_config(&config, Arc::new(notifier))?;

    let notification_task = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            log_notification(&notification);
        }
    });

    info!("Press Ctrl+C to exit");

    tokio::select! {
        state = session.run() => {
            if state != PermissionState::Granted {
                warn!("Location tracking is disabled until permission is granted");
            }
            wait_for_ctrl_c().await;
        }
        _ = wait_for_ctrl_c() => {}
    }

    info!("Received Ctrl+C, shutting down...");
    session.shutdown().await;
    notification_task.abort();

    Ok(())
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
