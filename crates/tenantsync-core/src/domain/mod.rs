//! Domain entities and business logic
//!
//! This module contains the core domain types for tenantsync:
//! - Newtypes for validated tenant/branch ids and object keys
//! - The blob namespace layout (template and tenant prefixes)
//! - Sync plans and the per-file pull/upload decision
//! - Push batches and operation reports
//! - Domain-specific error types

pub mod batch;
pub mod errors;
pub mod namespace;
pub mod newtypes;
pub mod plan;
pub mod report;

// Re-export commonly used types
pub use batch::PushBatch;
pub use errors::{DomainError, SyncError};
pub use namespace::{is_database_file, is_placeholder, leaf_name, NamespaceLayout};
pub use newtypes::*;
pub use plan::{decide_file_action, LocalFileState, SyncAction, SyncPlan};
pub use report::{
    FailureStage, FileFailure, InitializeReport, MigrationWarning, PulledObject, PushReport,
    UploadReport,
};
