//! Data merge engine
//!
//! Applies records pushed by a terminal to one table with last-write-wins
//! semantics. Each record becomes an upsert:
//!
//! ```sql
//! INSERT INTO "t" ("id", "monto", "last_modified") VALUES (?, ?, ?)
//! ON CONFLICT("id") DO UPDATE SET "monto" = excluded."monto", ...
//! WHERE "t"."last_modified" IS NULL OR excluded."last_modified" > "t"."last_modified"
//! ```
//!
//! New rows insert unconditionally; existing rows are only overwritten by a
//! strictly newer `last_modified`. Identifiers are never taken from the
//! payload as-is: the table, the primary key and every field name are looked
//! up in the staged file's schema first and emitted in their canonical
//! spelling.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection};
use sqlx::Connection;
use tenantsync_core::domain::PushBatch;
use tracing::debug;

use crate::reconciler::quote_ident;
use crate::schema::{introspect, TableSchema};
use crate::staging::StagedDatabase;
use crate::DbFileError;

/// Column every mergeable table must have
pub const LAST_MODIFIED_COLUMN: &str = "last_modified";

/// Columns never overwritten by an update
const IMMUTABLE_COLUMNS: &[&str] = &["id"];

/// Row counts of one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Rows inserted or updated
    pub merged: u64,
    /// Records skipped because the stored row was at least as recent
    pub stale: u64,
}

/// A record checked against the schema, ready to bind
struct ValidatedRecord<'a> {
    columns: Vec<&'a str>,
    values: Vec<&'a Value>,
}

fn validate_record<'a>(
    table: &'a TableSchema,
    primary_key: &str,
    index: usize,
    record: &'a Value,
) -> Result<ValidatedRecord<'a>, DbFileError> {
    let Value::Object(fields) = record else {
        return Err(DbFileError::InvalidBatch(format!(
            "record #{index} is not a JSON object"
        )));
    };

    let mut columns: Vec<&str> = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    for (field, value) in fields {
        let column = table.column(field).ok_or_else(|| {
            DbFileError::InvalidBatch(format!(
                "record #{index}: unknown column {field:?} in table {}",
                table.name
            ))
        })?;
        if columns.iter().any(|c| c.eq_ignore_ascii_case(&column.name)) {
            return Err(DbFileError::InvalidBatch(format!(
                "record #{index}: column {} given twice",
                column.name
            )));
        }
        columns.push(column.name.as_str());
        values.push(value);
    }

    match columns.iter().position(|c| c.eq_ignore_ascii_case(primary_key)) {
        None => {
            return Err(DbFileError::InvalidBatch(format!(
                "record #{index} is missing primary key {primary_key}"
            )));
        }
        // A NULL key never matches the conflict target and would insert a new row
        Some(pk) if values[pk].is_null() => {
            return Err(DbFileError::InvalidBatch(format!(
                "record #{index}: primary key {primary_key} is null"
            )));
        }
        Some(_) => {}
    }

    Ok(ValidatedRecord { columns, values })
}

fn upsert_statement(table: &str, primary_key: &str, columns: &[&str]) -> String {
    let table_q = quote_ident(table);
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| {
            !c.eq_ignore_ascii_case(primary_key)
                && !IMMUTABLE_COLUMNS.iter().any(|i| c.eq_ignore_ascii_case(i))
        })
        .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
        .collect();

    let mut sql = format!(
        "INSERT INTO {table_q} ({column_list}) VALUES ({placeholders}) ON CONFLICT({}) ",
        quote_ident(primary_key)
    );
    if updates.is_empty() {
        sql.push_str("DO NOTHING");
    } else {
        let lm = quote_ident(LAST_MODIFIED_COLUMN);
        sql.push_str(&format!(
            "DO UPDATE SET {} WHERE {table_q}.{lm} IS NULL OR excluded.{lm} > {table_q}.{lm}",
            updates.join(", ")
        ));
    }
    sql
}

fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
    }
}

/// Merges `records` into `table_name` inside one transaction
///
/// Records are applied in the given order. Validation happens for the whole
/// batch before any statement runs.
///
/// # Errors
///
/// Returns `DbFileError::InvalidBatch` for an unknown table or column, a
/// record without its primary key, a non-object record, or a table without a
/// `last_modified` column. Returns `DbFileError::MergeFailed` if a statement
/// fails; the transaction is rolled back.
pub async fn merge_records(
    conn: &mut SqliteConnection,
    table_name: &str,
    primary_key_column: &str,
    records: &[Value],
) -> Result<MergeOutcome, DbFileError> {
    let schema = introspect(&mut *conn).await?;
    let table = schema.table(table_name).ok_or_else(|| {
        DbFileError::InvalidBatch(format!("unknown table {table_name:?}"))
    })?;
    let primary_key = table
        .column(primary_key_column)
        .ok_or_else(|| {
            DbFileError::InvalidBatch(format!(
                "unknown primary key column {primary_key_column:?} in table {}",
                table.name
            ))
        })?
        .name
        .as_str();
    if !table.has_column(LAST_MODIFIED_COLUMN) {
        return Err(DbFileError::InvalidBatch(format!(
            "table {} has no {LAST_MODIFIED_COLUMN} column",
            table.name
        )));
    }

    let validated = records
        .iter()
        .enumerate()
        .map(|(i, record)| validate_record(table, primary_key, i, record))
        .collect::<Result<Vec<_>, _>>()?;

    let mut outcome = MergeOutcome::default();
    let mut tx = conn.begin().await?;
    for record in &validated {
        let sql = upsert_statement(&table.name, primary_key, &record.columns);
        let query = record
            .values
            .iter()
            .fold(sqlx::query(&sql), |q, v| bind_json(q, *v));

        match query.execute(&mut *tx).await {
            Ok(result) if result.rows_affected() > 0 => outcome.merged += 1,
            Ok(_) => outcome.stale += 1,
            Err(e) => {
                tx.rollback().await?;
                return Err(DbFileError::MergeFailed {
                    table: table.name.clone(),
                    statement: sql,
                    message: e.to_string(),
                });
            }
        }
    }
    tx.commit().await?;

    debug!(
        table = %table.name,
        merged = outcome.merged,
        stale = outcome.stale,
        "Merged records"
    );
    Ok(outcome)
}

/// Stages `bytes`, merges the batch and returns the new file bytes
///
/// # Errors
///
/// See [`merge_records`]; staging failures are reported as well.
pub async fn merge_batch(
    bytes: &[u8],
    batch: &PushBatch,
    staging_dir: Option<&Path>,
) -> Result<(Vec<u8>, MergeOutcome), DbFileError> {
    let staged = StagedDatabase::from_bytes(bytes, staging_dir)?;
    let mut conn = staged.connect().await?;
    let outcome = merge_records(
        &mut conn,
        &batch.table_name,
        &batch.primary_key_column,
        &batch.records,
    )
    .await;
    conn.close().await?;
    let outcome = outcome?;

    Ok((staged.read_bytes().await?, outcome))
}
