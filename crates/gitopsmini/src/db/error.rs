//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be mapped back to its domain type.
    #[error("Invalid value '{value}' in column '{column}'")]
    InvalidColumn { column: &'static str, value: String },

    /// An update targeted a row that does not exist.
    #[error("Application {0} not found")]
    AppNotFound(i64),

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}
