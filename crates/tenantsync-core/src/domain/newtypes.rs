//! Newtypes for type-safe identifiers and validated blob keys
//!
//! Tenant and branch ids arrive from an external auth collaborator and end up
//! as path segments of blob keys, so they are validated once at the boundary
//! and carried around as distinct types afterwards:
//!
//! - [`TenantId`] - Business id of a tenant (first key segment)
//! - [`BranchId`] - Sub-namespace of a tenant
//! - [`ObjectKey`] - Validated key of an object in the blob store
//! - [`TenantContext`] - The `{tenant_id, branch_id}` pair attached to a request

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Maximum length of a tenant or branch id.
pub const MAX_ID_LEN: usize = 128;

/// Checks the rules shared by tenant and branch ids.
///
/// Returns the reason the value was rejected, if any.
fn id_violation(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        return Some("must not be empty");
    }
    if value.len() > MAX_ID_LEN {
        return Some("must be at most 128 characters");
    }
    if value == "." || value == ".." {
        return Some("must not be '.' or '..'");
    }
    if value.starts_with('_') {
        return Some("must not start with '_' (reserved for templates)");
    }
    if value.contains('/') || value.contains('\\') {
        return Some("must not contain path separators");
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Some("must not contain whitespace or control characters");
    }
    None
}

// ============================================================================
// TenantId
// ============================================================================

/// Opaque business identifier of a tenant
///
/// Used verbatim as the first segment of every tenant-owned object key,
/// e.g. `acme/databases_generales/ventas.sqlite`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a validated tenant id
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidTenantId`] if the value is empty, too
    /// long, contains separators or whitespace, or starts with `_`.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        match id_violation(&value) {
            Some(reason) => Err(DomainError::InvalidTenantId(format!("{value:?} {reason}"))),
            None => Ok(Self(value)),
        }
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

// ============================================================================
// BranchId
// ============================================================================

/// Identifier of a branch (point of sale location) inside a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchId(String);

impl BranchId {
    /// Create a validated branch id
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidBranchId`] under the same rules as
    /// [`TenantId::new`].
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        match id_violation(&value) {
            Some(reason) => Err(DomainError::InvalidBranchId(format!("{value:?} {reason}"))),
            None => Ok(Self(value)),
        }
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BranchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BranchId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchId> for String {
    fn from(id: BranchId) -> Self {
        id.0
    }
}

// ============================================================================
// ObjectKey
// ============================================================================

/// Validated key of an object in the blob store
///
/// Keys are `/`-separated relative paths. A key is rejected when it is empty,
/// starts with `/`, contains an empty, `.` or `..` segment, a backslash or a
/// NUL byte. A single trailing `/` is allowed so that directory placeholders
/// can be addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a validated object key
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidObjectKey`] if the key violates any of
    /// the rules listed on the type.
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();

        if key.is_empty() {
            return Err(DomainError::InvalidObjectKey("key is empty".to_string()));
        }
        if key.starts_with('/') {
            return Err(DomainError::InvalidObjectKey(format!(
                "key must be relative: {key}"
            )));
        }
        if key.contains('\\') || key.contains('\0') {
            return Err(DomainError::InvalidObjectKey(format!(
                "key contains a forbidden character: {key:?}"
            )));
        }

        let body = key.strip_suffix('/').unwrap_or(&key);
        if body
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(DomainError::InvalidObjectKey(format!(
                "key contains an empty or relative segment: {key}"
            )));
        }

        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the key (the file name)
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        super::namespace::leaf_name(&self.0)
    }

    /// Whether the key lies under `prefix` (a `/`-terminated directory prefix)
    #[must_use]
    pub fn is_under(&self, prefix: &str) -> bool {
        self.0.len() > prefix.len() && self.0.starts_with(prefix)
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// TenantContext
// ============================================================================

/// Tenant/branch pair identifying the caller of a sync operation
///
/// Supplied by the external authentication collaborator; this crate trusts it
/// once both ids have passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub branch_id: BranchId,
}

impl TenantContext {
    #[must_use]
    pub fn new(tenant_id: TenantId, branch_id: BranchId) -> Self {
        Self {
            tenant_id,
            branch_id,
        }
    }

    /// Parse both ids from raw strings
    ///
    /// # Errors
    /// Returns the first validation error encountered.
    pub fn parse(tenant_id: &str, branch_id: &str) -> Result<Self, DomainError> {
        Ok(Self::new(TenantId::new(tenant_id)?, BranchId::new(branch_id)?))
    }
}

impl Display for TenantContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.branch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod tenant_id_tests {
        use super::*;

        #[test]
        fn test_accepts_plain_ids() {
            for id in ["acme", "empresa-01", "ACME_retail", "t.1"] {
                assert!(TenantId::new(id).is_ok(), "{id} should be valid");
            }
        }

        #[test]
        fn test_rejects_invalid_ids() {
            let too_long = "a".repeat(MAX_ID_LEN + 1);
            for id in ["", ".", "..", "_template", "a/b", "a b", "a\tb", too_long.as_str()] {
                assert!(
                    matches!(TenantId::new(id), Err(DomainError::InvalidTenantId(_))),
                    "{id:?} should be rejected"
                );
            }
        }

        #[test]
        fn test_max_length_is_inclusive() {
            assert!(TenantId::new("a".repeat(MAX_ID_LEN)).is_ok());
        }

        #[test]
        fn test_serde_rejects_invalid() {
            let ok: TenantId = serde_json::from_str("\"acme\"").unwrap();
            assert_eq!(ok.as_str(), "acme");
            assert!(serde_json::from_str::<TenantId>("\"_x\"").is_err());
        }
    }

    mod branch_id_tests {
        use super::*;

        #[test]
        fn test_branch_errors_are_branch_specific() {
            assert!(matches!(
                BranchId::new("../x"),
                Err(DomainError::InvalidBranchId(_))
            ));
            assert_eq!(BranchId::new("1").unwrap().to_string(), "1");
        }
    }

    mod object_key_tests {
        use super::*;

        #[test]
        fn test_valid_keys() {
            let key = ObjectKey::new("acme/suc_1/ventas.sqlite").unwrap();
            assert_eq!(key.leaf_name(), "ventas.sqlite");
            assert!(ObjectKey::new("acme/databases_generales/").is_ok());
        }

        #[test]
        fn test_invalid_keys() {
            for key in [
                "",
                "/acme/a.db",
                "acme//a.db",
                "acme/../other/a.db",
                "./a.db",
                "acme\\a.db",
                "acme/a\0.db",
                "acme/a.db//",
            ] {
                assert!(
                    matches!(ObjectKey::new(key), Err(DomainError::InvalidObjectKey(_))),
                    "{key:?} should be rejected"
                );
            }
        }

        #[test]
        fn test_is_under() {
            let key = ObjectKey::new("acme/suc_1/ventas.sqlite").unwrap();
            assert!(key.is_under("acme/"));
            assert!(key.is_under("acme/suc_1/"));
            assert!(!key.is_under("acme2/"));
            assert!(!ObjectKey::new("acme/").unwrap().is_under("acme/"));
        }
    }

    #[test]
    fn test_context_parse_and_display() {
        let ctx = TenantContext::parse("acme", "7").unwrap();
        assert_eq!(ctx.to_string(), "acme/7");
        assert!(TenantContext::parse("acme", "").is_err());
    }
}
