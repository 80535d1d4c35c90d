//! Tenant command - Run Initialize against the configured store
//!
//! Same code path as `POST /sync/initialize`: templates are cloned into the
//! tenant namespace, existing tenant files are migrated, and the resulting
//! plan is printed.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use tenantsync_core::config::Config;
use tenantsync_core::domain::{InitializeReport, SyncAction, TenantContext};
use tenantsync_engine::{StaticBranchDirectory, SyncOrchestrator, SyncSettings};
use tenantsync_store::build_object_store;
use tracing::info;

use super::load_config;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum TenantCommand {
    /// Create or align a tenant namespace and print the sync plan
    Init {
        /// Tenant id
        #[arg(long)]
        tenant: String,
        /// Branch id (must be listed for the tenant in the configuration)
        #[arg(long)]
        branch: String,
    },
}

impl TenantCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: Option<&Path>) -> Result<()> {
        match self {
            TenantCommand::Init { tenant, branch } => {
                let (config, path) = load_config(config_path)?;
                info!(config_path = %path.display(), tenant = %tenant, branch = %branch, "Initializing tenant");
                let report = initialize(&config, tenant, branch).await?;
                print_report(&report, format)
            }
        }
    }
}

/// Builds the orchestrator from `config` and runs one Initialize call
pub async fn initialize(config: &Config, tenant: &str, branch: &str) -> Result<InitializeReport> {
    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration: {}", messages.join("; "));
    }

    let ctx = TenantContext::parse(tenant, branch).context("Invalid tenant or branch id")?;
    let store = build_object_store(&config.store)
        .await
        .context("Failed to open object store")?;
    let directory =
        StaticBranchDirectory::from_config(config).context("Invalid tenant configuration")?;
    let orchestrator =
        SyncOrchestrator::new(store, Arc::new(directory), SyncSettings::from(&config.sync));

    orchestrator
        .initialize(&ctx, &[])
        .await
        .with_context(|| format!("Initialize failed for {tenant}/{branch}"))
}

fn print_report(report: &InitializeReport, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if format == OutputFormat::Json {
        let json = serde_json::to_value(report).context("Failed to serialize report")?;
        formatter.print_json(&json);
        return Ok(());
    }

    formatter.success(&format!(
        "Tenant {} / branch {} is ready",
        report.tenant_id, report.branch_id
    ));
    formatter.info(&format!("Templates copied: {}", report.copied_count()));
    formatter.info(&format!("Files migrated:   {}", report.migrated_count()));
    formatter.info(&format!("Files to pull:    {}", report.files_to_pull.len()));

    for action in report.plan.iter() {
        match action {
            SyncAction::CloneTemplate {
                source_key,
                dest_key,
            } => formatter.info(&format!("  copied   {source_key} -> {dest_key}")),
            SyncAction::MigrateSchema { key, statements } => {
                formatter.info(&format!("  migrated {key}"));
                for statement in statements {
                    formatter.info(&format!("    {statement}"));
                }
            }
            _ => {}
        }
    }
    for warning in &report.warnings {
        formatter.warn(&format!("{}: {} ({})", warning.key, warning.statement, warning.message));
    }
    for failure in &report.failures {
        formatter.error(&format!("{} [{}]: {}", failure.key, failure.stage, failure.reason));
    }

    Ok(())
}
