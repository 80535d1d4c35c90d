//! Config command - View and validate tenantsync configuration
//!
//! Provides the `tenantsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON), secrets masked
//! 2. Validates the configuration file and reports every error found

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tenantsync_core::config::Config;
use tracing::info;

use super::load_config;
use crate::output::{get_formatter, OutputFormat};

const MASK: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(format, config_path),
            ConfigCommand::Validate => execute_validate(format, config_path),
        }
    }
}

/// Copy of `config` safe to print
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.store.secret_access_key.is_some() {
        config.store.secret_access_key = Some(MASK.to_string());
    }
    config
}

fn execute_show(format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
    let formatter = get_formatter(format);
    let (config, path) = load_config(config_path)?;
    let config = redacted(&config);

    info!(config_path = %path.display(), "Showing configuration");

    if format == OutputFormat::Json {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

fn execute_validate(format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
    let formatter = get_formatter(format);
    let path = config_path.map_or_else(Config::default_path, Path::to_path_buf);

    // Load explicitly; a missing or broken file is itself a finding
    let mut config = match Config::load(&path) {
        Ok(config) => config,
        Err(e) => {
            let message = if path.exists() {
                format!("Failed to parse configuration: {e}")
            } else {
                "Configuration file not found".to_string()
            };
            if format == OutputFormat::Json {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", path.display()));
            }
            anyhow::bail!("configuration is not valid");
        }
    };
    config.apply_env_overrides();

    info!(config_path = %path.display(), "Validating configuration");
    let errors = config.validate();

    if format == OutputFormat::Json {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("configuration has {} error(s)", errors.len())
    }
}
