//! Schema reconciler
//!
//! Brings a tenant database forward to the schema of its template, additively:
//!
//! - a table present only in the template is created with the template's
//!   literal `CREATE TABLE` statement;
//! - a column present only in the template is added with
//!   `ALTER TABLE .. ADD COLUMN`, carrying `NOT NULL DEFAULT <x>` when the
//!   template column is NOT NULL and `DEFAULT <x>` when it only has a default.
//!
//! Nothing is ever dropped, renamed or retyped. Creations come first, then
//! alterations, both in template order. Applying the plan and reconciling
//! again yields an empty plan.

use std::path::Path;

use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tracing::{debug, warn};

use crate::schema::{introspect, ColumnInfo, DatabaseSchema};
use crate::staging::StagedDatabase;
use crate::DbFileError;

/// Keywords that cannot appear as bare identifiers
const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "BETWEEN", "BY", "CASE", "CHECK", "COLLATE", "COLUMN",
    "CONSTRAINT", "CREATE", "DEFAULT", "DELETE", "DISTINCT", "DROP", "ELSE", "END", "EXISTS",
    "FOREIGN", "FROM", "GROUP", "HAVING", "IN", "INDEX", "INSERT", "INTO", "IS", "JOIN", "KEY",
    "LIKE", "LIMIT", "NOT", "NULL", "ON", "OR", "ORDER", "PRIMARY", "REFERENCES", "SELECT", "SET",
    "TABLE", "THEN", "TO", "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "WHEN", "WHERE",
];

/// Quotes an identifier unless it is a plain, non-reserved name
#[must_use]
pub fn ident(name: &str) -> String {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name));
    if plain {
        name.to_string()
    } else {
        quote_ident(name)
    }
}

/// Always double-quotes an identifier
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Zero literal for a NOT NULL column without a default
fn zero_literal(decl_type: &str) -> &'static str {
    let upper = decl_type.to_ascii_uppercase();
    let numeric = ["INT", "REAL", "FLOA", "DOUB", "NUM", "DEC", "BOOL"]
        .iter()
        .any(|marker| upper.contains(marker));
    if numeric {
        "0"
    } else {
        "''"
    }
}

fn add_column_statement(table: &str, column: &ColumnInfo) -> String {
    let mut stmt = format!("ALTER TABLE {} ADD COLUMN {}", ident(table), ident(&column.name));
    if !column.decl_type.is_empty() {
        stmt.push(' ');
        stmt.push_str(&column.decl_type);
    }

    let default = column
        .default_value
        .as_deref()
        .filter(|d| !d.eq_ignore_ascii_case("NULL"));
    if column.not_null {
        stmt.push_str(" NOT NULL DEFAULT ");
        stmt.push_str(default.unwrap_or_else(|| zero_literal(&column.decl_type)));
    } else if let Some(default) = default {
        stmt.push_str(" DEFAULT ");
        stmt.push_str(default);
    }
    stmt
}

/// Computes the statements that bring `tenant` up to `template`
///
/// Pure: no I/O, no mutation.
#[must_use]
pub fn plan_migration(template: &DatabaseSchema, tenant: &DatabaseSchema) -> Vec<String> {
    let mut creations = Vec::new();
    let mut alterations = Vec::new();

    for table in &template.tables {
        match tenant.table(&table.name) {
            None => creations.push(table.create_sql.clone()),
            Some(existing) => {
                for column in &table.columns {
                    if !existing.has_column(&column.name) {
                        alterations.push(add_column_statement(&existing.name, column));
                    }
                }
            }
        }
    }

    creations.extend(alterations);
    creations
}

/// A statement skipped because the database already satisfied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaWarning {
    pub statement: String,
    pub message: String,
}

/// A statement that failed and stopped the migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaFailure {
    pub statement: String,
    pub message: String,
}

/// What [`apply_migration`] did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    /// Statements that ran successfully
    pub applied: Vec<String>,
    pub warnings: Vec<SchemaWarning>,
    /// First statement that failed; nothing after it was attempted
    pub failed: Option<SchemaFailure>,
}

impl MigrationOutcome {
    /// The recorded failure as an error, if any
    pub fn failure(&self) -> Option<DbFileError> {
        self.failed.as_ref().map(|f| DbFileError::MigrationFailed {
            statement: f.statement.clone(),
            message: f.message.clone(),
        })
    }
}

fn is_benign(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("duplicate column name") || lower.contains("already exists")
}

/// Runs `statements` in order, each under its own savepoint
///
/// A statement that fails because the database already has the table or
/// column becomes a [`SchemaWarning`]. Any other failure undoes only that
/// statement, is recorded in [`MigrationOutcome::failed`] and stops the run;
/// the statements applied before it are committed.
///
/// # Errors
///
/// Returns `DbFileError::QueryFailed` if the transaction itself cannot be
/// opened, released or committed.
pub async fn apply_migration(
    conn: &mut SqliteConnection,
    statements: &[String],
) -> Result<MigrationOutcome, DbFileError> {
    let mut outcome = MigrationOutcome::default();
    if statements.is_empty() {
        return Ok(outcome);
    }

    let mut tx = conn.begin().await?;
    for (index, statement) in statements.iter().enumerate() {
        let mut step = Connection::begin(&mut *tx).await?;
        match sqlx::Executor::execute(&mut *step, sqlx::raw_sql(statement)).await {
            Ok(_) => {
                step.commit().await?;
                debug!(statement = %statement, "Applied schema statement");
                outcome.applied.push(statement.clone());
            }
            Err(e) => {
                step.rollback().await?;
                let message = e.to_string();
                if is_benign(&message) {
                    warn!(statement = %statement, error = %message, "Schema statement already satisfied");
                    outcome.warnings.push(SchemaWarning {
                        statement: statement.clone(),
                        message,
                    });
                } else {
                    warn!(
                        statement = %statement,
                        error = %message,
                        skipped = statements.len() - index - 1,
                        "Schema statement failed; keeping earlier statements"
                    );
                    outcome.failed = Some(SchemaFailure {
                        statement: statement.clone(),
                        message,
                    });
                    break;
                }
            }
        }
    }
    tx.commit().await?;

    Ok(outcome)
}

/// Result of reconciling one tenant file against its template
#[derive(Debug, Clone, Default)]
pub struct ReconcileResult {
    /// Planned statements, empty when the tenant is up to date
    pub statements: Vec<String>,
    pub outcome: MigrationOutcome,
    /// Migrated tenant bytes, present when at least one statement was applied,
    /// even if a later one failed
    pub migrated_bytes: Option<Vec<u8>>,
}

/// Diffs, migrates and re-serializes a tenant database
///
/// Both inputs are staged; the template read-only. The tenant bytes passed
/// in are never modified.
///
/// # Errors
///
/// Returns `DbFileError` if either file cannot be staged or read. A failing
/// statement is reported in the outcome, not as an error.
pub async fn reconcile(
    template: &[u8],
    tenant: &[u8],
    staging_dir: Option<&Path>,
) -> Result<ReconcileResult, DbFileError> {
    let template_schema = crate::schema::inspect_schema(template, staging_dir).await?;

    let staged = StagedDatabase::from_bytes(tenant, staging_dir)?;
    let mut conn = staged.connect().await?;

    let tenant_schema = introspect(&mut conn).await?;
    let statements = plan_migration(&template_schema, &tenant_schema);
    if statements.is_empty() {
        conn.close().await?;
        return Ok(ReconcileResult::default());
    }

    let outcome = apply_migration(&mut conn, &statements).await;
    conn.close().await?;
    let outcome = outcome?;

    let migrated_bytes = if outcome.applied.is_empty() {
        None
    } else {
        Some(staged.read_bytes().await?)
    };

    Ok(ReconcileResult {
        statements,
        outcome,
        migrated_bytes,
    })
}
