//! CLI subcommands

pub mod config;
pub mod schema;
pub mod tenant;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tenantsync_core::config::Config;

/// Loads the configuration the way the daemon does.
///
/// An explicit `--config` path must exist and parse; the default location
/// falls back to built-in defaults. Environment overrides apply in both cases.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, PathBuf)> {
    let (mut config, path) = match explicit {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            (config, path.to_path_buf())
        }
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path), path)
        }
    };
    config.apply_env_overrides();
    Ok((config, path))
}
