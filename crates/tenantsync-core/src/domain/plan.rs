//! Sync plan produced by an Initialize call
//!
//! A plan is an ordered list of typed [`SyncAction`]s. Some actions report
//! work already done on the cloud side during the call (template copies and
//! migrations); the rest tell the terminal what to do next (mirror a
//! directory, pull a file, upload its newer copy). Plans are produced per call
//! and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::object_store::ObjectInfo;

/// A single step of a sync plan
///
/// Serialized with an `action` tag; the tag names are part of the wire
/// protocol spoken by the terminals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum SyncAction {
    /// The terminal should mirror this cloud directory locally
    #[serde(rename = "ensure_dir")]
    EnsureDir { key: String },

    /// A template database was cloned into the tenant namespace
    #[serde(rename = "descargar_db_modelo")]
    CloneTemplate { source_key: String, dest_key: String },

    /// The tenant database was migrated with these statements
    #[serde(rename = "migrar_esquema")]
    MigrateSchema { key: String, statements: Vec<String> },

    /// The terminal should pull this file
    #[serde(rename = "actualizar_datos")]
    PullData { key: String },

    /// The terminal holds a newer copy and should upload it
    #[serde(rename = "subir_db")]
    UploadDb { key: String },
}

impl SyncAction {
    /// Key the action refers to (the destination for template copies)
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::EnsureDir { key }
            | Self::MigrateSchema { key, .. }
            | Self::PullData { key }
            | Self::UploadDb { key } => key,
            Self::CloneTemplate { dest_key, .. } => dest_key,
        }
    }
}

/// Ordered list of actions for one Initialize call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncPlan {
    actions: Vec<SyncAction>,
}

impl SyncPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: SyncAction) {
        self.actions.push(action);
    }

    #[must_use]
    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncAction> {
        self.actions.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// State of a file on the terminal, optionally reported on Initialize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileState {
    /// Cloud key the local file mirrors
    pub key: String,
    /// Modification time of the local copy
    pub last_modified: DateTime<Utc>,
    /// Content hash of the local copy, when the terminal tracks it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Decide what the terminal should do with one cloud file
///
/// - equal hashes: nothing
/// - no local copy, or the cloud copy is newer: pull
/// - the local copy is newer: upload
/// - same timestamp without a matching hash: nothing
#[must_use]
pub fn decide_file_action(cloud: &ObjectInfo, local: Option<&LocalFileState>) -> Option<SyncAction> {
    let Some(local) = local else {
        return Some(SyncAction::PullData {
            key: cloud.key.clone(),
        });
    };

    if local.hash.as_deref() == Some(cloud.content_hash.as_str()) {
        return None;
    }

    if cloud.last_modified > local.last_modified {
        Some(SyncAction::PullData {
            key: cloud.key.clone(),
        })
    } else if local.last_modified > cloud.last_modified {
        Some(SyncAction::UploadDb {
            key: cloud.key.clone(),
        })
    } else {
        None
    }
}
