//! Schema introspection
//!
//! Reads the user tables of a database from `sqlite_master` in enumeration
//! (rowid) order, and the columns of each table from `pragma_table_info` in
//! declaration order. Internal `sqlite_*` tables are skipped.

use std::path::Path;

use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;

use crate::staging::StagedDatabase;
use crate::DbFileError;

/// One column as declared in `CREATE TABLE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type, empty when the column has none
    pub decl_type: String,
    pub not_null: bool,
    /// Default expression as SQL text (`0`, `'abc'`, `NULL`)
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// One user table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    /// Literal `CREATE TABLE` statement from `sqlite_master`
    pub create_sql: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Finds a column by name, ignoring ASCII case like SQLite does
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Every user table of one database, in enumeration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DatabaseSchema {
    pub tables: Vec<TableSchema>,
}

impl DatabaseSchema {
    /// Finds a table by name, ignoring ASCII case
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

/// Reads the schema through an open connection
///
/// # Errors
///
/// Returns `DbFileError::QueryFailed` if the catalog cannot be read.
pub async fn introspect(conn: &mut SqliteConnection) -> Result<DatabaseSchema, DbFileError> {
    let tables: Vec<(String, Option<String>)> = sqlx::query_as(
        r"SELECT name, sql FROM sqlite_master
          WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
          ORDER BY rowid",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut schema = DatabaseSchema::default();
    for (name, sql) in tables {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(&name)
        .fetch_all(&mut *conn)
        .await?;

        let columns = rows
            .into_iter()
            .map(|(name, decl_type, not_null, default_value, pk)| ColumnInfo {
                name,
                decl_type,
                not_null: not_null != 0,
                default_value,
                primary_key: pk != 0,
            })
            .collect();

        schema.tables.push(TableSchema {
            name,
            create_sql: sql.unwrap_or_default(),
            columns,
        });
    }

    Ok(schema)
}

/// Stages `bytes` read-only and returns its schema
///
/// # Errors
///
/// Returns `DbFileError` if the bytes are not a readable SQLite database.
pub async fn inspect_schema(
    bytes: &[u8],
    staging_dir: Option<&Path>,
) -> Result<DatabaseSchema, DbFileError> {
    let staged = StagedDatabase::from_bytes(bytes, staging_dir)?;
    let mut conn = staged.connect_read_only().await?;
    let schema = introspect(&mut conn).await;
    conn.close().await?;
    schema
}
