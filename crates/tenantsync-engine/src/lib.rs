//! tenantsync Engine - Sync orchestration
//!
//! Provides:
//! - First-touch alignment of tenant namespaces with the template databases
//! - Additive schema migration of tenant files
//! - Pull, push (record merge) and whole-file upload with optimistic concurrency
//!
//! ## Modules
//!
//! - [`orchestrator`] - The [`SyncOrchestrator`] state machine behind every endpoint
//! - [`directory`] - Branch directory built from the `tenants` configuration
//! - [`locks`] - Per-key async write locks

pub mod directory;
pub mod locks;
pub mod orchestrator;

pub use directory::StaticBranchDirectory;
pub use locks::{KeyGuard, KeyLocks};
pub use orchestrator::{SyncOrchestrator, SyncSettings};

use tenantsync_core::domain::SyncError;
use tenantsync_core::ports::StoreError;
use tenantsync_sqlite::DbFileError;

/// Maps an object store failure onto the sync error taxonomy
///
/// A missing object surfaces as `NotFound` and a lost conditional write as
/// `Conflict`; everything else stays a store error.
pub(crate) fn from_store(err: StoreError) -> SyncError {
    match err {
        StoreError::NotFound(key) => SyncError::NotFound(format!("object {key} does not exist")),
        StoreError::PreconditionFailed {
            key,
            expected,
            actual,
        } => SyncError::Conflict(format!(
            "object {key} changed: expected hash {expected}, found {}",
            actual.as_deref().unwrap_or("<missing>")
        )),
        other => SyncError::Store(other),
    }
}

/// Maps a database file failure onto the sync error taxonomy
pub(crate) fn from_db_file(err: DbFileError) -> SyncError {
    match err {
        DbFileError::InvalidBatch(_) | DbFileError::MergeFailed { .. } => {
            SyncError::Merge(err.to_string())
        }
        // A stored file that fails to open is a server-side problem
        _ => SyncError::Internal(err.to_string()),
    }
}
