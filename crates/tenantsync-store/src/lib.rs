//! tenantsync Store - Object store adapters
//!
//! Implementations of the `IObjectStore` port from `tenantsync-core`:
//! - [`S3ObjectStore`] - S3-compatible services (Cloudflare R2, MinIO, AWS S3)
//! - [`FilesystemObjectStore`] - A directory tree on local disk
//! - [`MemoryObjectStore`] - A process-local map, used by tests
//!
//! ## Modules
//!
//! - [`s3`] - AWS SDK based adapter with native conditional writes
//! - [`filesystem`] - Atomic temp-file-and-rename writes, SHA-256 content hashes
//! - [`memory`] - `BTreeMap` behind an async lock

pub mod filesystem;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tenantsync_core::config::{StoreBackend, StoreConfig};
use tenantsync_core::ports::{IObjectStore, StoreError};

pub use filesystem::FilesystemObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Content hash used by the local backends: lowercase hex SHA-256
pub(crate) fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Builds the backend selected by `config`
///
/// The store is returned behind the port trait so it can be injected into the
/// sync orchestrator.
///
/// # Errors
///
/// Returns `StoreError::Backend` if the configuration is incomplete for the
/// selected backend, or `StoreError::Io` if the filesystem root cannot be
/// created.
pub async fn build_object_store(config: &StoreConfig) -> Result<Arc<dyn IObjectStore>, StoreError> {
    let store: Arc<dyn IObjectStore> = match config.backend {
        StoreBackend::S3 => Arc::new(S3ObjectStore::from_config(config).await?),
        StoreBackend::Filesystem => Arc::new(FilesystemObjectStore::new(&config.root).await?),
        StoreBackend::Memory => Arc::new(MemoryObjectStore::new()),
    };

    tracing::info!(backend = store.backend_name(), "Object store ready");
    Ok(store)
}
