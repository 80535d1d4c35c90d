//! TenantSync daemon - HTTP sync service for multi-tenant SQLite files
//!
//! Loads the YAML configuration (path from `$TENANTSYNC_CONFIG`), opens the
//! configured object store and serves the sync endpoints until SIGTERM or
//! SIGINT.

use std::sync::Arc;

use anyhow::{Context, Result};
use tenantsync_core::config::{Config, LogFormat, LoggingConfig};
use tenantsync_server::{build_state, MetricsRegistry, SyncServer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Startup
// ============================================================================

fn load_config() -> (Config, std::path::PathBuf) {
    let config_path = Config::default_path();
    let mut config = Config::load_or_default(&config_path);
    config.apply_env_overrides();
    (config, config_path)
}

/// Installs the global subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init(),
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
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
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    token.cancel();
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = load_config();
    init_tracing(&config.logging);

    info!(config_path = %config_path.display(), "TenantSync daemon starting (tenantsyncd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for err in &errors {
            error!(field = %err.field, message = %err.message, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
    let state = build_state(&config, metrics).await?;
    let server = SyncServer::bind(&config.server.listen_addr, state).await?;

    let result = server.run(shutdown_token).await;

    match &result {
        Ok(()) => info!("TenantSync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "TenantSync daemon exiting with error"),
    }

    result
}
