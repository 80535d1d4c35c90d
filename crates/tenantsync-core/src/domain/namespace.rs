//! Blob namespace layout
//!
//! Every object lives in one of two namespaces:
//!
//! - the template namespace (`_template/` by default), holding the canonical
//!   databases under `databases_generales/` (tenant-wide) and
//!   `plantilla_sucursal/` (per branch);
//! - a tenant namespace (`<tenant>/`), holding the tenant-wide copies under
//!   `<tenant>/databases_generales/` and one directory per branch, by default
//!   `<tenant>/suc_<branch>/`.
//!
//! All prefixes produced here end with `/`.

use super::newtypes::{BranchId, TenantId};
use crate::config::SyncConfig;

/// File extensions treated as SQLite database files
pub const DATABASE_EXTENSIONS: &[&str] = &["sqlite", "sqlite3", "db"];

/// Leaf name of placeholder objects that only mark a directory
pub const PLACEHOLDER_LEAF: &str = ".keep";

/// Directory names that shape the key layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceLayout {
    pub template_root: String,
    pub general_dir: String,
    pub branch_template_dir: String,
    pub branch_dir_prefix: String,
}

impl Default for NamespaceLayout {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for NamespaceLayout {
    fn from(config: &SyncConfig) -> Self {
        Self {
            template_root: trim_slashes(&config.template_root).to_string(),
            general_dir: trim_slashes(&config.general_dir).to_string(),
            branch_template_dir: trim_slashes(&config.branch_template_dir).to_string(),
            branch_dir_prefix: config.branch_dir_prefix.clone(),
        }
    }
}

impl NamespaceLayout {
    /// `_template/databases_generales/`
    #[must_use]
    pub fn template_general_prefix(&self) -> String {
        format!("{}/{}/", self.template_root, self.general_dir)
    }

    /// `_template/plantilla_sucursal/`
    #[must_use]
    pub fn template_branch_prefix(&self) -> String {
        format!("{}/{}/", self.template_root, self.branch_template_dir)
    }

    /// `<tenant>/`
    #[must_use]
    pub fn tenant_prefix(&self, tenant: &TenantId) -> String {
        format!("{tenant}/")
    }

    /// `<tenant>/databases_generales/`
    #[must_use]
    pub fn tenant_general_prefix(&self, tenant: &TenantId) -> String {
        format!("{tenant}/{}/", self.general_dir)
    }

    /// Branch directory used when no explicit directory is configured:
    /// `<tenant>/suc_<branch>/`
    #[must_use]
    pub fn default_branch_prefix(&self, tenant: &TenantId, branch: &BranchId) -> String {
        format!("{tenant}/{}{branch}/", self.branch_dir_prefix)
    }

    /// Branch directory for an explicitly configured directory name
    #[must_use]
    pub fn branch_prefix_for_dir(&self, tenant: &TenantId, dir: &str) -> String {
        format!("{tenant}/{}/", trim_slashes(dir))
    }
}

fn trim_slashes(value: &str) -> &str {
    value.trim_matches('/')
}

/// Last segment of a key, ignoring a trailing `/`
#[must_use]
pub fn leaf_name(key: &str) -> &str {
    let body = key.strip_suffix('/').unwrap_or(key);
    body.rsplit('/').next().unwrap_or(body)
}

/// Whether the key names a SQLite database by extension (case-insensitive)
#[must_use]
pub fn is_database_file(key: &str) -> bool {
    let leaf = leaf_name(key);
    match leaf.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => DATABASE_EXTENSIONS
            .iter()
            .any(|candidate| ext.eq_ignore_ascii_case(candidate)),
        _ => false,
    }
}

/// Whether the key is a directory marker rather than real content
#[must_use]
pub fn is_placeholder(key: &str) -> bool {
    key.ends_with('/') || leaf_name(key) == PLACEHOLDER_LEAF
}
