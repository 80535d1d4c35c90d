//! Configuration module for tenantsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, environment overrides, validation, defaults, and a builder
//! pattern for programmatic use.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{BranchId, TenantId};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "TENANTSYNC_CONFIG";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for tenantsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    /// Tenants and branches known to the static branch directory.
    pub tenants: Vec<TenantConfig>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP adapter binds to.
    pub listen_addr: String,
    /// Largest accepted request body (in MiB).
    pub max_body_mb: u64,
}

/// Object store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    S3,
    Filesystem,
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 => f.write_str("s3"),
            Self::Filesystem => f.write_str("filesystem"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// S3 bucket name.
    pub bucket: Option<String>,
    /// S3 endpoint URL (R2 account endpoint, MinIO URL). `None` uses AWS.
    pub endpoint: Option<String>,
    /// S3 region; R2 expects `auto`.
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Address buckets as `endpoint/bucket/key` instead of `bucket.endpoint/key`.
    pub force_path_style: bool,
    /// Key prefix prepended to every object key (S3 only).
    pub prefix: Option<String>,
    /// Root directory of the filesystem backend.
    pub root: PathBuf,
}

/// Namespace layout and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the template namespace. Must start with `_`.
    pub template_root: String,
    /// Directory holding tenant-wide databases, in templates and tenants.
    pub general_dir: String,
    /// Template directory holding per-branch databases.
    pub branch_template_dir: String,
    /// Prefix of default branch directories (`suc_` gives `<tenant>/suc_<branch>/`).
    pub branch_dir_prefix: String,
    /// Directory for staged database copies. `None` uses the system temp dir.
    pub staging_dir: Option<PathBuf>,
    /// Reject pushes and uploads that carry no base hash.
    pub require_base_hash: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

/// A tenant served by this instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    #[serde(default)]
    pub branches: Vec<BranchConfig>,
}

/// A branch of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub id: String,
    /// Directory name under the tenant, overriding `<branch_dir_prefix><id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// `$TENANTSYNC_CONFIG` when set, otherwise
    /// `$XDG_CONFIG_HOME/tenantsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tenantsync")
            .join("config.yaml")
    }

    /// Apply `TENANTSYNC_*` environment overrides on top of the file values.
    ///
    /// Credentials are expected to come from the environment rather than the
    /// YAML file in production.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` in place of the process environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("TENANTSYNC_S3_ACCESS_KEY_ID") {
            self.store.access_key_id = Some(v);
        }
        if let Some(v) = get("TENANTSYNC_S3_SECRET_ACCESS_KEY") {
            self.store.secret_access_key = Some(v);
        }
        if let Some(v) = get("TENANTSYNC_S3_BUCKET") {
            self.store.bucket = Some(v);
        }
        if let Some(v) = get("TENANTSYNC_S3_ENDPOINT") {
            self.store.endpoint = Some(v);
        }
        if let Some(v) = get("TENANTSYNC_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
    }

    /// Largest accepted request body in bytes.
    pub fn max_body_bytes(&self) -> usize {
        usize::try_from(self.server.max_body_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            max_body_mb: 64,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Filesystem,
            bucket: None,
            endpoint: None,
            region: "auto".to_string(),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            prefix: None,
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("tenantsync")
                .join("objects"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            template_root: "_template".to_string(),
            general_dir: "databases_generales".to_string(),
            branch_template_dir: "plantilla_sucursal".to_string(),
            branch_dir_prefix: "suc_".to_string(),
            staging_dir: None,
            require_base_hash: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"store.bucket"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_single_segment(value: &str) -> bool {
    !value.is_empty() && !value.contains('/') && value != "." && value != ".."
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: String| {
            errors.push(ValidationError { field, message });
        };

        // --- server ---
        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            push(
                "server.listen_addr".into(),
                format!("not a socket address: {}", self.server.listen_addr),
            );
        }
        if self.server.max_body_mb == 0 {
            push("server.max_body_mb".into(), "must be greater than 0".into());
        }

        // --- store ---
        match self.store.backend {
            StoreBackend::S3 => {
                if self.store.bucket.as_deref().map_or(true, str::is_empty) {
                    push("store.bucket".into(), "required for the s3 backend".into());
                }
                if self.store.access_key_id.is_some() != self.store.secret_access_key.is_some() {
                    push(
                        "store.access_key_id".into(),
                        "access_key_id and secret_access_key must be set together".into(),
                    );
                }
                if self.store.region.is_empty() {
                    push("store.region".into(), "must not be empty".into());
                }
                if let Some(endpoint) = &self.store.endpoint {
                    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                        push(
                            "store.endpoint".into(),
                            format!("must be an http(s) URL: {endpoint}"),
                        );
                    }
                }
            }
            StoreBackend::Filesystem => {
                if self.store.root.as_os_str().is_empty() {
                    push("store.root".into(), "required for the filesystem backend".into());
                }
            }
            StoreBackend::Memory => {}
        }

        // --- sync ---
        if !self.sync.template_root.starts_with('_') {
            push(
                "sync.template_root".into(),
                "must start with '_' so it cannot collide with a tenant id".into(),
            );
        }
        for (field, value) in [
            ("sync.template_root", &self.sync.template_root),
            ("sync.general_dir", &self.sync.general_dir),
            ("sync.branch_template_dir", &self.sync.branch_template_dir),
        ] {
            if !is_single_segment(value.trim_matches('/')) {
                push(field.into(), format!("must be a single path segment: {value:?}"));
            }
        }
        if self.sync.branch_dir_prefix.contains('/') {
            push(
                "sync.branch_dir_prefix".into(),
                "must not contain '/'".into(),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level".into(),
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        // --- tenants ---
        let mut seen_tenants = HashSet::new();
        for (i, tenant) in self.tenants.iter().enumerate() {
            if let Err(e) = TenantId::new(tenant.id.as_str()) {
                push(format!("tenants[{i}].id"), e.to_string());
            }
            if !seen_tenants.insert(tenant.id.as_str()) {
                push(format!("tenants[{i}].id"), format!("duplicate tenant '{}'", tenant.id));
            }

            let mut seen_branches = HashSet::new();
            for (j, branch) in tenant.branches.iter().enumerate() {
                if let Err(e) = BranchId::new(branch.id.as_str()) {
                    push(format!("tenants[{i}].branches[{j}].id"), e.to_string());
                }
                if !seen_branches.insert(branch.id.as_str()) {
                    push(
                        format!("tenants[{i}].branches[{j}].id"),
                        format!("duplicate branch '{}'", branch.id),
                    );
                }
                if let Some(dir) = &branch.dir {
                    let trimmed = dir.trim_matches('/');
                    if !is_single_segment(trimmed) || trimmed == self.sync.general_dir {
                        push(
                            format!("tenants[{i}].branches[{j}].dir"),
                            format!("must be a single segment other than the general dir: {dir:?}"),
                        );
                    }
                }
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use tenantsync_core::config::{ConfigBuilder, StoreBackend};
///
/// let config = ConfigBuilder::new()
///     .store_backend(StoreBackend::Memory)
///     .listen_addr("127.0.0.1:0")
///     .tenant("acme", &["1", "2"])
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- server ---

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    pub fn max_body_mb(mut self, mb: u64) -> Self {
        self.config.server.max_body_mb = mb;
        self
    }

    // --- store ---

    pub fn store_backend(mut self, backend: StoreBackend) -> Self {
        self.config.store.backend = backend;
        self
    }

    pub fn store_root(mut self, root: PathBuf) -> Self {
        self.config.store.root = root;
        self
    }

    /// Configure the S3 backend in one call.
    pub fn s3(
        mut self,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.config.store.backend = StoreBackend::S3;
        self.config.store.bucket = Some(bucket.into());
        self.config.store.endpoint = Some(endpoint.into());
        self.config.store.access_key_id = Some(access_key_id.into());
        self.config.store.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn force_path_style(mut self, enabled: bool) -> Self {
        self.config.store.force_path_style = enabled;
        self
    }

    pub fn store_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.store.prefix = Some(prefix.into());
        self
    }

    // --- sync ---

    pub fn template_root(mut self, root: impl Into<String>) -> Self {
        self.config.sync.template_root = root.into();
        self
    }

    pub fn staging_dir(mut self, dir: PathBuf) -> Self {
        self.config.sync.staging_dir = Some(dir);
        self
    }

    pub fn require_base_hash(mut self, required: bool) -> Self {
        self.config.sync.require_base_hash = required;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    // --- tenants ---

    /// Register a tenant whose branches use the default directory naming.
    pub fn tenant(mut self, id: impl Into<String>, branches: &[&str]) -> Self {
        self.config.tenants.push(TenantConfig {
            id: id.into(),
            branches: branches
                .iter()
                .map(|b| BranchConfig {
                    id: (*b).to_string(),
                    dir: None,
                })
                .collect(),
        });
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
