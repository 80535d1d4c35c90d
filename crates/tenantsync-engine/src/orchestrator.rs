//! Sync orchestrator
//!
//! The [`SyncOrchestrator`] drives every operation a terminal can request.
//!
//! ## Initialize Flow
//!
//! 1. **Resolve**: look up the branch directory; unknown branches fail before
//!    any store call
//! 2. **Align**: copy template files missing from the tenant namespace
//! 3. **Migrate**: reconcile every database present on both sides and
//!    re-upload the migrated copy; statements applied before a failing one
//!    are uploaded and the failure is reported
//! 4. **Manifest**: list the tenant and branch directories
//! 5. **Plan**: build the ordered action list returned to the terminal
//!
//! Align and Migrate fail per file; the call still returns a full manifest.
//!
//! ## Writes
//!
//! Every write to a tenant file holds the in-process lock for its key and,
//! when it replaces content it read, is conditional on the hash read.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tenantsync_core::config::SyncConfig;
use tenantsync_core::domain::{
    decide_file_action, is_database_file, is_placeholder, FailureStage, FileFailure,
    InitializeReport, LocalFileState, MigrationWarning, NamespaceLayout, ObjectKey, PulledObject,
    PushBatch, PushReport, SyncAction, SyncError, SyncPlan, TenantContext, UploadReport,
};
use tenantsync_core::ports::{BranchLocation, IBranchDirectory, IObjectStore, ObjectInfo};
use tenantsync_sqlite::{is_sqlite, merge_batch, reconcile, MigrationOutcome};
use tracing::{debug, info, instrument, warn};

use crate::locks::KeyLocks;
use crate::{from_db_file, from_store};

// ============================================================================
// Settings
// ============================================================================

/// Orchestrator settings derived from the `sync` configuration section
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    pub layout: NamespaceLayout,
    /// Directory for staged SQLite copies (system temp dir when `None`)
    pub staging_dir: Option<PathBuf>,
    /// Reject pushes and uploads that carry no base hash
    pub require_base_hash: bool,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            layout: NamespaceLayout::from(config),
            staging_dir: config.staging_dir.clone(),
            require_base_hash: config.require_base_hash,
        }
    }
}

// ============================================================================
// Initialize bookkeeping
// ============================================================================

/// A template directory and the tenant directory it is mirrored into
#[derive(Debug, Clone)]
struct Mirror {
    template_prefix: String,
    tenant_prefix: String,
}

/// Work recorded while aligning and migrating
#[derive(Debug, Default)]
struct Progress {
    clones: Vec<SyncAction>,
    migrations: Vec<SyncAction>,
    warnings: Vec<MigrationWarning>,
    failures: Vec<FileFailure>,
}

impl Progress {
    fn fail(&mut self, key: &str, stage: FailureStage, err: &SyncError) {
        warn!(key = %key, stage = %stage, error = %err, "File could not be synchronized");
        self.failures.push(FileFailure {
            key: key.to_string(),
            stage,
            reason: err.to_string(),
        });
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Coordinates the object store, the branch directory and the SQLite engines
///
/// ## Dependencies
///
/// - `store`: Where template and tenant databases live
/// - `directory`: Which branches exist and where their files are kept
pub struct SyncOrchestrator {
    store: Arc<dyn IObjectStore>,
    directory: Arc<dyn IBranchDirectory>,
    settings: SyncSettings,
    locks: KeyLocks,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over the given store and branch directory
    pub fn new(
        store: Arc<dyn IObjectStore>,
        directory: Arc<dyn IBranchDirectory>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            directory,
            settings,
            locks: KeyLocks::new(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn staging_dir(&self) -> Option<&Path> {
        self.settings.staging_dir.as_deref()
    }

    // ------------------------------------------------------------------------
    // Initialize
    // ------------------------------------------------------------------------

    /// Aligns and migrates the tenant's files and returns the sync plan
    ///
    /// # Arguments
    /// * `ctx` - Validated tenant and branch of the caller
    /// * `local_files` - Files the terminal already holds; may be empty
    ///
    /// # Errors
    ///
    /// - `SyncError::NotFound` if the branch is not registered
    /// - `SyncError::Store` if a directory listing fails
    ///
    /// Failures copying or migrating single files are reported in
    /// [`InitializeReport::failures`] instead.
    #[instrument(skip(self, ctx, local_files), fields(tenant = %ctx.tenant_id, branch = %ctx.branch_id))]
    pub async fn initialize(
        &self,
        ctx: &TenantContext,
        local_files: &[LocalFileState],
    ) -> Result<InitializeReport, SyncError> {
        let location = self.resolve_branch(ctx).await?;
        let layout = &self.settings.layout;
        let mirrors = [
            Mirror {
                template_prefix: layout.template_general_prefix(),
                tenant_prefix: layout.tenant_general_prefix(&ctx.tenant_id),
            },
            Mirror {
                template_prefix: layout.template_branch_prefix(),
                tenant_prefix: location.prefix,
            },
        ];

        let mut progress = Progress::default();
        for mirror in &mirrors {
            self.align_and_migrate(mirror, &mut progress).await?;
        }

        let mut manifest: BTreeMap<String, ObjectInfo> = BTreeMap::new();
        for mirror in &mirrors {
            for object in self.store.list(&mirror.tenant_prefix).await? {
                manifest.insert(object.key.clone(), object);
            }
        }

        let local: HashMap<&str, &LocalFileState> = local_files
            .iter()
            .map(|file| (file.key.as_str(), file))
            .collect();

        let mut plan = SyncPlan::new();
        for mirror in &mirrors {
            plan.push(SyncAction::EnsureDir {
                key: mirror.tenant_prefix.clone(),
            });
        }
        for action in progress.clones.into_iter().chain(progress.migrations) {
            plan.push(action);
        }
        for object in manifest.values() {
            if let Some(action) = decide_file_action(object, local.get(object.key.as_str()).copied())
            {
                plan.push(action);
            }
        }

        let report = InitializeReport {
            tenant_id: ctx.tenant_id.clone(),
            branch_id: ctx.branch_id.clone(),
            files_to_pull: manifest.into_keys().collect(),
            plan,
            warnings: progress.warnings,
            failures: progress.failures,
        };

        info!(
            copied = report.copied_count(),
            migrated = report.migrated_count(),
            files = report.files_to_pull.len(),
            failures = report.failures.len(),
            "Tenant namespace ready"
        );
        Ok(report)
    }

    async fn resolve_branch(&self, ctx: &TenantContext) -> Result<BranchLocation, SyncError> {
        self.directory
            .resolve(&ctx.tenant_id, &ctx.branch_id)
            .await
            .map_err(|e| SyncError::Internal(format!("branch lookup failed: {e:#}")))?
            .ok_or_else(|| {
                SyncError::NotFound(format!(
                    "branch {} of tenant {} is not registered",
                    ctx.branch_id, ctx.tenant_id
                ))
            })
    }

    async fn align_and_migrate(
        &self,
        mirror: &Mirror,
        progress: &mut Progress,
    ) -> Result<(), SyncError> {
        let templates = self.store.list(&mirror.template_prefix).await?;
        let existing: HashMap<String, ObjectInfo> = self
            .store
            .list(&mirror.tenant_prefix)
            .await?
            .into_iter()
            .filter_map(|object| {
                let relative = object.key.strip_prefix(&mirror.tenant_prefix)?.to_string();
                Some((relative, object))
            })
            .collect();

        debug!(
            template_prefix = %mirror.template_prefix,
            tenant_prefix = %mirror.tenant_prefix,
            templates = templates.len(),
            existing = existing.len(),
            "Aligning directory"
        );

        for template in &templates {
            let Some(relative) = template.key.strip_prefix(&mirror.template_prefix) else {
                continue;
            };
            let dest = format!("{}{relative}", mirror.tenant_prefix);

            if !existing.contains_key(relative) {
                match self.copy_if_absent(&template.key, &dest).await {
                    Ok(true) => progress.clones.push(SyncAction::CloneTemplate {
                        source_key: template.key.clone(),
                        dest_key: dest,
                    }),
                    Ok(false) => {}
                    Err(err) => progress.fail(&dest, FailureStage::Align, &err),
                }
                continue;
            }

            if !is_database_file(&template.key) {
                continue;
            }

            match self.migrate_file(&template.key, &dest).await {
                Ok(outcome) => {
                    let failure = outcome.failure();
                    progress
                        .warnings
                        .extend(outcome.warnings.into_iter().map(|w| MigrationWarning {
                            key: dest.clone(),
                            statement: w.statement,
                            message: w.message,
                        }));
                    if !outcome.applied.is_empty() {
                        info!(key = %dest, statements = outcome.applied.len(), "Migrated tenant database");
                        progress.migrations.push(SyncAction::MigrateSchema {
                            key: dest.clone(),
                            statements: outcome.applied,
                        });
                    }
                    if let Some(err) = failure {
                        progress.fail(&dest, FailureStage::Migrate, &from_db_file(err));
                    }
                }
                Err(err) => progress.fail(&dest, FailureStage::Migrate, &err),
            }
        }

        Ok(())
    }

    /// Copies a template into the tenant namespace unless the destination
    /// appeared in the meantime; returns whether a copy was made
    async fn copy_if_absent(&self, source: &str, dest: &str) -> Result<bool, SyncError> {
        let source = ObjectKey::new(source)?;
        let dest = ObjectKey::new(dest)?;

        let _guard = self.locks.lock(dest.as_str()).await;
        match self.store.head(&dest).await {
            Ok(_) => return Ok(false),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        self.store.copy(&source, &dest).await.map_err(from_store)?;
        info!(source = %source, dest = %dest, "Cloned template database");
        Ok(true)
    }

    async fn migrate_file(&self, template: &str, tenant: &str) -> Result<MigrationOutcome, SyncError> {
        let template = ObjectKey::new(template)?;
        let tenant = ObjectKey::new(tenant)?;

        let _guard = self.locks.lock(tenant.as_str()).await;
        let template_bytes = self.store.get(&template).await.map_err(from_store)?;
        let head = self.store.head(&tenant).await.map_err(from_store)?;
        let tenant_bytes = self.store.get(&tenant).await.map_err(from_store)?;

        let result = reconcile(&template_bytes, &tenant_bytes, self.staging_dir())
            .await
            .map_err(from_db_file)?;

        if let Some(migrated) = result.migrated_bytes {
            self.store
                .put_if_match(&tenant, migrated, &head.content_hash)
                .await
                .map_err(from_store)?;
        }

        Ok(result.outcome)
    }

    // ------------------------------------------------------------------------
    // Pull / Push / Upload
    // ------------------------------------------------------------------------

    /// Downloads one file of the caller's tenant
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidRequest` if the key is malformed
    /// - `SyncError::Forbidden` if the key is outside the tenant namespace
    /// - `SyncError::NotFound` if the object does not exist
    #[instrument(skip(self, ctx), fields(tenant = %ctx.tenant_id))]
    pub async fn pull(&self, ctx: &TenantContext, key: &str) -> Result<PulledObject, SyncError> {
        let key = self.tenant_key(ctx, key)?;

        // Hash before bytes: a racing write leaves the caller with a stale
        // hash, so its next conditional write conflicts
        let head = self.store.head(&key).await.map_err(from_store)?;
        let bytes = self.store.get(&key).await.map_err(from_store)?;

        debug!(key = %key, size = bytes.len(), "Pulled object");
        Ok(PulledObject {
            key: key.into(),
            bytes,
            content_hash: head.content_hash,
        })
    }

    /// Merges a batch of records into a tenant database
    ///
    /// The file is downloaded, merged on a staged copy and uploaded back on
    /// condition that it did not change in between.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidRequest` if the path is malformed or not a database
    /// - `SyncError::NotFound` if the database does not exist
    /// - `SyncError::Conflict` if the base hash does not match, is required
    ///   but missing, or the file changed during the merge
    /// - `SyncError::Merge` if the batch is rejected; nothing is written
    #[instrument(
        skip(self, ctx, batch),
        fields(tenant = %ctx.tenant_id, table = %batch.table_name, records = batch.records.len())
    )]
    pub async fn push(&self, ctx: &TenantContext, batch: &PushBatch) -> Result<PushReport, SyncError> {
        let relative = batch.db_relative_path.trim_start_matches('/');
        let key = ObjectKey::new(format!(
            "{}{relative}",
            self.settings.layout.tenant_prefix(&ctx.tenant_id)
        ))?;
        if !is_database_file(key.as_str()) {
            return Err(SyncError::InvalidRequest(format!(
                "{relative} is not a database file"
            )));
        }

        let _guard = self.locks.lock(key.as_str()).await;
        let head = self.store.head(&key).await.map_err(from_store)?;
        self.check_base_hash(&key, batch.base_hash.as_deref(), &head.content_hash)?;

        let bytes = self.store.get(&key).await.map_err(from_store)?;
        let (merged_bytes, outcome) = merge_batch(&bytes, batch, self.staging_dir())
            .await
            .map_err(from_db_file)?;

        let content_hash = if outcome.merged == 0 {
            head.content_hash
        } else {
            self.store
                .put_if_match(&key, merged_bytes, &head.content_hash)
                .await
                .map_err(from_store)?
        };

        info!(
            key = %key,
            merged = outcome.merged,
            stale = outcome.stale,
            "Merged push batch"
        );
        Ok(PushReport {
            db_key: key.into(),
            merged_records: outcome.merged,
            stale_records: outcome.stale,
            content_hash,
        })
    }

    /// Replaces a whole tenant file
    ///
    /// With `base_hash` the write only happens if the stored object still has
    /// that hash; a missing object counts as a mismatch.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidRequest` if the key is malformed, names a
    ///   directory, or a database key receives non-SQLite bytes
    /// - `SyncError::Forbidden` if the key is outside the tenant namespace
    /// - `SyncError::Conflict` on a hash mismatch or a required hash missing
    #[instrument(skip(self, ctx, bytes), fields(tenant = %ctx.tenant_id, size = bytes.len()))]
    pub async fn upload(
        &self,
        ctx: &TenantContext,
        key: &str,
        bytes: Vec<u8>,
        base_hash: Option<&str>,
    ) -> Result<UploadReport, SyncError> {
        let key = self.tenant_key(ctx, key)?;
        if is_placeholder(key.as_str()) {
            return Err(SyncError::InvalidRequest(format!(
                "{key} names a directory marker"
            )));
        }
        if is_database_file(key.as_str()) && !is_sqlite(&bytes) {
            return Err(SyncError::InvalidRequest(format!(
                "{key} must be a SQLite database"
            )));
        }

        let _guard = self.locks.lock(key.as_str()).await;
        let content_hash = match base_hash {
            Some(expected) => self
                .store
                .put_if_match(&key, bytes, expected)
                .await
                .map_err(from_store)?,
            None if self.settings.require_base_hash => {
                return Err(SyncError::Conflict(format!(
                    "a base hash is required to overwrite {key}"
                )))
            }
            None => self.store.put(&key, bytes).await.map_err(from_store)?,
        };

        info!(key = %key, conditional = base_hash.is_some(), "Uploaded file");
        Ok(UploadReport {
            key: key.into(),
            content_hash,
        })
    }

    /// Parses `raw` and checks it lies inside the caller's tenant namespace
    fn tenant_key(&self, ctx: &TenantContext, raw: &str) -> Result<ObjectKey, SyncError> {
        let key = ObjectKey::new(raw)?;
        let prefix = self.settings.layout.tenant_prefix(&ctx.tenant_id);
        if !key.is_under(&prefix) {
            return Err(SyncError::Forbidden(format!(
                "{key} is outside the namespace of tenant {}",
                ctx.tenant_id
            )));
        }
        Ok(key)
    }

    fn check_base_hash(
        &self,
        key: &ObjectKey,
        supplied: Option<&str>,
        current: &str,
    ) -> Result<(), SyncError> {
        match supplied {
            Some(expected) if expected != current => Err(SyncError::Conflict(format!(
                "{key} changed: base hash {expected}, current hash {current}"
            ))),
            None if self.settings.require_base_hash => Err(SyncError::Conflict(format!(
                "a base hash is required to modify {key}"
            ))),
            _ => Ok(()),
        }
    }
}
