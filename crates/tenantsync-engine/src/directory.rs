//! Branch directory backed by the `tenants` configuration section

use std::collections::HashMap;

use tenantsync_core::config::Config;
use tenantsync_core::domain::{BranchId, DomainError, NamespaceLayout, TenantId};
use tenantsync_core::ports::{BranchLocation, IBranchDirectory};

/// In-memory branch directory
///
/// Each configured branch maps to `<tenant>/<dir>/` when the branch names an
/// explicit directory, or to `<tenant>/<branch_dir_prefix><branch>/` otherwise.
#[derive(Debug, Clone, Default)]
pub struct StaticBranchDirectory {
    tenants: HashMap<TenantId, HashMap<BranchId, String>>,
}

impl StaticBranchDirectory {
    /// Builds the directory from the configured tenants
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if a tenant or branch id is invalid.
    pub fn from_config(config: &Config) -> Result<Self, DomainError> {
        let layout = NamespaceLayout::from(&config.sync);
        let mut directory = Self::default();

        for tenant in &config.tenants {
            let tenant_id = TenantId::new(tenant.id.as_str())?;
            for branch in &tenant.branches {
                let branch_id = BranchId::new(branch.id.as_str())?;
                let prefix = match &branch.dir {
                    Some(dir) => layout.branch_prefix_for_dir(&tenant_id, dir),
                    None => layout.default_branch_prefix(&tenant_id, &branch_id),
                };
                directory.insert(tenant_id.clone(), branch_id, prefix);
            }
        }

        Ok(directory)
    }

    /// Registers a branch under an explicit prefix
    pub fn insert(&mut self, tenant: TenantId, branch: BranchId, prefix: String) {
        self.tenants.entry(tenant).or_default().insert(branch, prefix);
    }

    /// Total number of branches across all tenants
    pub fn branch_count(&self) -> usize {
        self.tenants.values().map(HashMap::len).sum()
    }
}

#[async_trait::async_trait]
impl IBranchDirectory for StaticBranchDirectory {
    async fn resolve(
        &self,
        tenant: &TenantId,
        branch: &BranchId,
    ) -> anyhow::Result<Option<BranchLocation>> {
        Ok(self
            .tenants
            .get(tenant)
            .and_then(|branches| branches.get(branch))
            .map(|prefix| BranchLocation {
                branch_id: branch.clone(),
                prefix: prefix.clone(),
            }))
    }
}
