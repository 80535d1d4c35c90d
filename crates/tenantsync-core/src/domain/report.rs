//! Results of sync operations

use serde::{Deserialize, Serialize};

use super::newtypes::{BranchId, TenantId};
use super::plan::SyncPlan;

/// Phase of Initialize in which a per-file failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Align,
    Migrate,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Align => f.write_str("align"),
            Self::Migrate => f.write_str("migrate"),
        }
    }
}

/// A file that could not be aligned or migrated; the rest of the call went on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub key: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// A migration statement skipped because the file already satisfied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationWarning {
    pub key: String,
    pub statement: String,
    pub message: String,
}

/// Outcome of an Initialize call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeReport {
    pub tenant_id: TenantId,
    pub branch_id: BranchId,
    /// Every real file under the tenant-wide and branch prefixes, sorted
    pub files_to_pull: Vec<String>,
    pub plan: SyncPlan,
    #[serde(default)]
    pub warnings: Vec<MigrationWarning>,
    #[serde(default)]
    pub failures: Vec<FileFailure>,
}

impl InitializeReport {
    /// Number of templates cloned during the call
    #[must_use]
    pub fn copied_count(&self) -> usize {
        self.plan
            .iter()
            .filter(|a| matches!(a, super::plan::SyncAction::CloneTemplate { .. }))
            .count()
    }

    /// Number of tenant files migrated during the call
    #[must_use]
    pub fn migrated_count(&self) -> usize {
        self.plan
            .iter()
            .filter(|a| matches!(a, super::plan::SyncAction::MigrateSchema { .. }))
            .count()
    }
}

/// Outcome of a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub db_key: String,
    /// Rows inserted or updated
    pub merged_records: u64,
    /// Rows skipped because the stored copy was at least as recent
    pub stale_records: u64,
    /// Hash of the object after the re-upload
    pub content_hash: String,
}

/// Outcome of a whole-file upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub key: String,
    pub content_hash: String,
}

/// Bytes of a pulled object with the hash the client should echo back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_hash: String,
}
