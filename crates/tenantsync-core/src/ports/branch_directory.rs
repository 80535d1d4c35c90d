//! Branch directory port
//!
//! Resolves a tenant/branch pair to the cloud directory owned by that branch.
//! Tenant provisioning lives outside this system; the directory is how the
//! orchestrator learns which branches exist.

use crate::domain::newtypes::{BranchId, TenantId};

/// Cloud location of one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchLocation {
    pub branch_id: BranchId,
    /// Key prefix of the branch directory, ending with `/`
    pub prefix: String,
}

/// Port trait for branch lookup
#[async_trait::async_trait]
pub trait IBranchDirectory: Send + Sync {
    /// Looks up the branch, returning `None` when the tenant or the branch is
    /// unknown
    async fn resolve(
        &self,
        tenant: &TenantId,
        branch: &BranchId,
    ) -> anyhow::Result<Option<BranchLocation>>;
}
