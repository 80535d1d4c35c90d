//! Scoped staging of database blobs
//!
//! SQLite needs a real file to open. A [`StagedDatabase`] copies a blob into a
//! named temp file, hands out connections to it, and reads the bytes back once
//! the work is done. The temp file is removed when the value is dropped, on
//! success and on every error path alike.
//!
//! Writable connections force `journal_mode = DELETE` so that every committed
//! change lives in the main file and the bytes read back are self-contained.

use std::io::Write;
use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::ConnectOptions;
use tempfile::NamedTempFile;

use crate::DbFileError;

/// First 16 bytes of every SQLite 3 database file
pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Whether `bytes` start with the SQLite 3 file header
#[must_use]
pub fn is_sqlite(bytes: &[u8]) -> bool {
    bytes.starts_with(SQLITE_HEADER)
}

/// A database blob copied into a temp file
pub struct StagedDatabase {
    file: NamedTempFile,
}

impl StagedDatabase {
    /// Stages `bytes` in `staging_dir` (or the system temp dir)
    ///
    /// An empty blob is accepted and opens as an empty database.
    ///
    /// # Errors
    ///
    /// Returns `DbFileError::NotSqlite` if the bytes carry no SQLite header,
    /// or `DbFileError::Staging` if the temp file cannot be written.
    pub fn from_bytes(bytes: &[u8], staging_dir: Option<&Path>) -> Result<Self, DbFileError> {
        if !bytes.is_empty() && !is_sqlite(bytes) {
            return Err(DbFileError::NotSqlite(format!(
                "{} bytes without a SQLite header",
                bytes.len()
            )));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("tenantsync-").suffix(".sqlite");
        let mut file = match staging_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    DbFileError::Staging(format!(
                        "Failed to create staging directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };

        file.write_all(bytes)?;
        file.flush()?;

        tracing::trace!(path = %file.path().display(), size = bytes.len(), "Staged database");

        Ok(Self { file })
    }

    /// Path of the staged file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Opens a writable connection to the staged file
    ///
    /// # Errors
    ///
    /// Returns `DbFileError::OpenFailed` if SQLite rejects the file.
    pub async fn connect(&self) -> Result<SqliteConnection, DbFileError> {
        let options = SqliteConnectOptions::new()
            .filename(self.path())
            .create_if_missing(false)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(false);
        self.open(options).await
    }

    /// Opens a read-only connection to the staged file
    ///
    /// # Errors
    ///
    /// Returns `DbFileError::OpenFailed` if SQLite rejects the file.
    pub async fn connect_read_only(&self) -> Result<SqliteConnection, DbFileError> {
        let options = SqliteConnectOptions::new()
            .filename(self.path())
            .create_if_missing(false)
            .read_only(true);
        self.open(options).await
    }

    async fn open(&self, options: SqliteConnectOptions) -> Result<SqliteConnection, DbFileError> {
        options.connect().await.map_err(|e| {
            DbFileError::OpenFailed(format!(
                "Failed to open staged database {}: {}",
                self.path().display(),
                e
            ))
        })
    }

    /// Reads the staged file back
    ///
    /// Every connection to the file must be closed first.
    ///
    /// # Errors
    ///
    /// Returns `DbFileError::Staging` if the file cannot be read.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, DbFileError> {
        Ok(tokio::fs::read(self.path()).await?)
    }
}
