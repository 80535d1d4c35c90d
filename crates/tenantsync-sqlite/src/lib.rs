//! tenantsync SQLite - Work on database files held as blobs
//!
//! Tenant databases travel through the object store as opaque bytes. This
//! crate turns those bytes into something SQLite can open, and back:
//! - Staging of a blob into a scoped temp file
//! - Schema introspection through `sqlite_master` / `pragma_table_info`
//! - Additive schema reconciliation against a template
//! - Last-write-wins merging of pushed records
//!
//! ## Key Components
//!
//! - [`StagedDatabase`] - Temp-file copy of a blob, deleted on drop
//! - [`inspect_schema`] / [`plan_migration`] / [`reconcile`] - Schema reconciler
//! - [`merge_batch`] - Data merge engine
//! - [`DbFileError`] - Error types for database file operations
//!
//! ## Usage
//!
//! ```no_run
//! use tenantsync_sqlite::reconcile;
//!
//! # async fn example(template: Vec<u8>, tenant: Vec<u8>) -> Result<(), tenantsync_sqlite::DbFileError> {
//! let result = reconcile(&template, &tenant, None).await?;
//! if let Some(migrated) = result.migrated_bytes {
//!     // upload `migrated` in place of the tenant file
//! #   let _ = migrated;
//! }
//! # Ok(())
//! # }
//! ```

pub mod merge;
pub mod reconciler;
pub mod schema;
pub mod staging;

pub use merge::{merge_batch, merge_records, MergeOutcome};
pub use reconciler::{
    apply_migration, plan_migration, reconcile, MigrationOutcome, ReconcileResult, SchemaFailure,
    SchemaWarning,
};
pub use schema::{inspect_schema, introspect, ColumnInfo, DatabaseSchema, TableSchema};
pub use staging::{is_sqlite, StagedDatabase, SQLITE_HEADER};

/// Errors that can occur while working on a database file
#[derive(Debug, thiserror::Error)]
pub enum DbFileError {
    /// Writing or reading the staged temp file failed
    #[error("Staging failed: {0}")]
    Staging(String),

    /// The bytes are not a SQLite database
    #[error("Not a SQLite database: {0}")]
    NotSqlite(String),

    /// Opening the staged file failed
    #[error("Open failed: {0}")]
    OpenFailed(String),

    /// A query outside a migration or merge failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A migration statement failed; statements before it were kept
    #[error("Migration failed at `{statement}`: {message}")]
    MigrationFailed { statement: String, message: String },

    /// A push batch was rejected before any SQL ran
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// A merge statement failed; the whole batch was rolled back
    #[error("Merge into table {table} failed at `{statement}`: {message}")]
    MergeFailed {
        table: String,
        statement: String,
        message: String,
    },
}

impl From<sqlx::Error> for DbFileError {
    fn from(e: sqlx::Error) -> Self {
        DbFileError::QueryFailed(e.to_string())
    }
}

impl From<std::io::Error> for DbFileError {
    fn from(e: std::io::Error) -> Self {
        DbFileError::Staging(e.to_string())
    }
}
