//! Schema command - Compare and migrate local database files
//!
//! Provides the `tenantsync schema` CLI command which:
//! 1. Prints the additive migration a tenant file needs to match its template
//! 2. Applies that migration to the local tenant file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tenantsync_sqlite::{inspect_schema, plan_migration, reconcile, ReconcileResult};
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    /// Print the statements that would bring TENANT up to TEMPLATE
    Diff {
        /// Template (model) database file
        template: PathBuf,
        /// Tenant database file
        tenant: PathBuf,
    },
    /// Apply the missing tables and columns to TENANT in place
    Migrate {
        /// Template (model) database file
        template: PathBuf,
        /// Tenant database file, rewritten when changed
        tenant: PathBuf,
    },
}

impl SchemaCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            SchemaCommand::Diff { template, tenant } => {
                execute_diff(template, tenant, format).await
            }
            SchemaCommand::Migrate { template, tenant } => {
                execute_migrate(template, tenant, format).await
            }
        }
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Statements needed to align `tenant` with `template`, in apply order
pub async fn diff_files(template: &Path, tenant: &Path) -> Result<Vec<String>> {
    let template_schema = inspect_schema(&read_file(template).await?, None)
        .await
        .with_context(|| format!("Failed to inspect {}", template.display()))?;
    let tenant_schema = inspect_schema(&read_file(tenant).await?, None)
        .await
        .with_context(|| format!("Failed to inspect {}", tenant.display()))?;

    Ok(plan_migration(&template_schema, &tenant_schema))
}

/// Migrates `tenant` in place; the file is replaced only when a statement applied
///
/// Statements applied before a failing one are written too; the failure is
/// left in the returned outcome.
pub async fn migrate_file(template: &Path, tenant: &Path) -> Result<ReconcileResult> {
    let template_bytes = read_file(template).await?;
    let tenant_bytes = read_file(tenant).await?;

    let result = reconcile(&template_bytes, &tenant_bytes, None)
        .await
        .with_context(|| format!("Failed to migrate {}", tenant.display()))?;

    if let Some(bytes) = &result.migrated_bytes {
        let file_name = tenant
            .file_name()
            .with_context(|| format!("Not a file path: {}", tenant.display()))?
            .to_string_lossy();
        let temp = tenant.with_file_name(format!(".{file_name}.migrating"));
        tokio::fs::write(&temp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, tenant)
            .await
            .with_context(|| format!("Failed to replace {}", tenant.display()))?;
        info!(path = %tenant.display(), statements = result.outcome.applied.len(), "Tenant file migrated");
    }

    Ok(result)
}

async fn execute_diff(template: &Path, tenant: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let statements = diff_files(template, tenant).await?;

    if format == OutputFormat::Json {
        formatter.print_json(&serde_json::json!({
            "template": template.display().to_string(),
            "tenant": tenant.display().to_string(),
            "up_to_date": statements.is_empty(),
            "statements": statements,
        }));
    } else if statements.is_empty() {
        formatter.success(&format!("{} is up to date", tenant.display()));
    } else {
        formatter.success(&format!(
            "{} needs {} statement{}:",
            tenant.display(),
            statements.len(),
            if statements.len() == 1 { "" } else { "s" }
        ));
        for statement in &statements {
            formatter.info(&format!("{statement};"));
        }
    }

    Ok(())
}

async fn execute_migrate(template: &Path, tenant: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let result = migrate_file(template, tenant).await?;
    let outcome = &result.outcome;

    if format == OutputFormat::Json {
        let warnings: Vec<_> = outcome
            .warnings
            .iter()
            .map(|w| serde_json::json!({"statement": w.statement, "message": w.message}))
            .collect();
        formatter.print_json(&serde_json::json!({
            "tenant": tenant.display().to_string(),
            "planned": result.statements,
            "applied": outcome.applied,
            "warnings": warnings,
            "failed": outcome.failed,
            "rewritten": result.migrated_bytes.is_some(),
        }));
        return failure_as_error(&result, tenant);
    }

    if result.statements.is_empty() {
        formatter.success(&format!("{} is up to date", tenant.display()));
        return Ok(());
    }

    formatter.success(&format!(
        "Applied {} of {} statements to {}",
        outcome.applied.len(),
        result.statements.len(),
        tenant.display()
    ));
    for statement in &outcome.applied {
        formatter.info(&format!("{statement};"));
    }
    for warning in &outcome.warnings {
        formatter.warn(&format!("{} ({})", warning.statement, warning.message));
    }
    if let Some(failed) = &outcome.failed {
        formatter.error(&format!("{} ({})", failed.statement, failed.message));
    }

    failure_as_error(&result, tenant)
}

/// A statement that failed still exits non-zero once the kept part is written
fn failure_as_error(result: &ReconcileResult, tenant: &Path) -> Result<()> {
    match result.outcome.failure() {
        Some(err) => Err(err).with_context(|| format!("Failed to migrate {}", tenant.display())),
        None => Ok(()),
    }
}
