//! Object store port (driven/secondary port)
//!
//! This module defines the interface to the blob store holding template and
//! tenant database files. The production implementation targets
//! S3-compatible services (Cloudflare R2, MinIO, AWS S3); a local filesystem
//! and an in-memory implementation exist for development and tests.
//!
//! ## Design Notes
//!
//! - Unlike the other ports, failures are classified ([`StoreError`]) because
//!   the orchestrator reacts differently to a missing object and to a lost
//!   precondition.
//! - Content hashes are opaque strings. S3 returns its ETag with the quotes
//!   stripped; the local backends return a SHA-256 hex digest.
//! - No retries and no caching happen behind this trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::newtypes::ObjectKey;

/// Errors reported by object store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// A conditional write found a different object than expected
    #[error("precondition failed for {key}: expected {expected}, found {}", actual.as_deref().unwrap_or("nothing"))]
    PreconditionFailed {
        key: String,
        expected: String,
        /// Hash of the live object, when the backend can tell
        actual: Option<String>,
    },

    /// Any other backend failure (network, auth, service error)
    #[error("backend error: {0}")]
    Backend(String),

    /// Local I/O failure (filesystem backend)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true for [`StoreError::NotFound`]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Listing entry for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_hash: String,
}

/// Metadata of one object, as returned by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub content_hash: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Port trait for blob store operations
///
/// ## Implementation Notes
///
/// - `list` must page through the whole prefix and leave out directory
///   placeholders (keys ending in `/` and `.keep` markers).
/// - `put_if_match` must be atomic with respect to other writers going
///   through the same backend: on S3 through the native `If-Match` header,
///   elsewhere by comparing under a lock.
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// Lists every object whose key starts with `prefix`
    ///
    /// # Arguments
    /// * `prefix` - Key prefix, normally ending with `/`
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Downloads the full content of an object
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the object does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError>;

    /// Uploads an object unconditionally, returning its new content hash
    async fn put(&self, key: &ObjectKey, data: Vec<u8>) -> Result<String, StoreError>;

    /// Uploads an object only if its current content hash equals `expected_hash`
    ///
    /// # Errors
    /// [`StoreError::PreconditionFailed`] if the object changed or does not
    /// exist
    async fn put_if_match(
        &self,
        key: &ObjectKey,
        data: Vec<u8>,
        expected_hash: &str,
    ) -> Result<String, StoreError>;

    /// Fetches object metadata without the body
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the object does not exist
    async fn head(&self, key: &ObjectKey) -> Result<ObjectHead, StoreError>;

    /// Copies an object inside the store, server-side where possible
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the source does not exist
    async fn copy(&self, source: &ObjectKey, dest: &ObjectKey) -> Result<(), StoreError>;

    /// Short backend name used in logs and metrics (`s3`, `filesystem`, `memory`)
    fn backend_name(&self) -> &'static str;
}
