//! TenantSync HTTP service
//!
//! Exposes the sync orchestrator over HTTP/1:
//! - [`server`]: listener and accept loop
//! - [`routes`]: request routing and handlers
//! - [`context`]: tenant headers, preconditions and query parameters
//! - [`error`]: JSON error responses
//! - [`metrics`]: Prometheus counters served on `/metrics`
//! - [`instrumented`]: store decorator counting transferred bytes

use std::sync::Arc;

use anyhow::Context;
use tenantsync_core::config::Config;
use tenantsync_core::ports::IObjectStore;
use tenantsync_engine::{StaticBranchDirectory, SyncOrchestrator, SyncSettings};
use tenantsync_store::build_object_store;
use tracing::info;

pub mod context;
pub mod error;
pub mod instrumented;
pub mod metrics;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use instrumented::InstrumentedStore;
pub use metrics::MetricsRegistry;
pub use server::{AppState, SyncServer};

/// Wires the configured store, branch directory and orchestrator together.
///
/// # Errors
///
/// Returns an error if the object store cannot be opened or the tenant list
/// contains an invalid id.
pub async fn build_state(config: &Config, metrics: Arc<MetricsRegistry>) -> anyhow::Result<AppState> {
    let store = build_object_store(&config.store)
        .await
        .context("Failed to open object store")?;
    info!(backend = store.backend_name(), "Object store ready");

    let store: Arc<dyn IObjectStore> = Arc::new(InstrumentedStore::new(store, Arc::clone(&metrics)));
    let directory =
        StaticBranchDirectory::from_config(config).context("Invalid tenant configuration")?;
    info!(branches = directory.branch_count(), "Branch directory loaded");

    let orchestrator = SyncOrchestrator::new(
        store,
        Arc::new(directory),
        SyncSettings::from(&config.sync),
    );

    Ok(AppState {
        orchestrator,
        metrics,
        max_body_bytes: config.max_body_bytes(),
    })
}
