//! HTTP server for the sync endpoints
//!
//! One hyper HTTP/1 connection task per accepted socket; the accept loop stops
//! when the cancellation token fires.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tenantsync_core::domain::SyncError;
use tenantsync_engine::SyncOrchestrator;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ApiError;
use crate::metrics::MetricsRegistry;
use crate::routes;

/// Shared state of all request handlers
pub struct AppState {
    pub orchestrator: SyncOrchestrator,
    pub metrics: Arc<MetricsRegistry>,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
}

impl AppState {
    /// Counts the outcome of a sync operation and converts its error
    pub(crate) fn track<T>(
        &self,
        operation: &str,
        result: Result<T, SyncError>,
    ) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.metrics.record_sync_operation(operation, "success");
                Ok(value)
            }
            Err(err) => {
                self.metrics.record_sync_operation(operation, err.kind());
                Err(err.into())
            }
        }
    }
}

/// HTTP server bound to a listening socket
pub struct SyncServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl SyncServer {
    /// Binds the listening socket.
    ///
    /// # Arguments
    /// * `addr` - Address to bind, e.g. `"127.0.0.1:8080"`; port 0 picks a free port
    /// * `state` - Handler state
    pub async fn bind(addr: &str, state: AppState) -> anyhow::Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid listen address: {addr}"))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves requests until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task or awaited from `main`.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "Sync server listening");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, peer) = result?;
                    let io = TokioIo::new(stream);
                    let state = Arc::clone(&self.state);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| routes::handle(req, Arc::clone(&state)));

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(peer = %peer, error = %e, "HTTP connection error");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("Sync server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
