//! TenantSync CLI - Operator tools for tenantsync
//!
//! Provides commands for:
//! - Diffing and migrating local SQLite files against a template
//! - Initializing a tenant namespace in the configured store
//! - Inspecting and validating the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{config::ConfigCommand, schema::SchemaCommand, tenant::TenantCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "tenantsync", version, about = "Multi-tenant SQLite sync operator tools")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare and migrate local database files
    #[command(subcommand)]
    Schema(SchemaCommand),
    /// Tenant namespace operations against the configured store
    #[command(subcommand)]
    Tenant(TenantCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Schema(cmd) => cmd.execute(format).await,
        Commands::Tenant(cmd) => cmd.execute(format, config_path).await,
        Commands::Config(cmd) => cmd.execute(format, config_path).await,
    }
}
