//! Storage bootstrap: the wide table, its `EntityKind` index, and the
//! schema version stamped on the database file.
//!
//! # Responsibility
//! - Hand out connections with `BUSY_TIMEOUT` applied and migrations run.
//! - Render table and index DDL from a validated `TableConfig`.
//!
//! # Invariants
//! - `PRAGMA user_version` records the newest applied wide-table migration.
//! - A `VersionedStore` is only built over a migrated connection.

use crate::config::ConfigError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

/// Failure to open or migrate the wide-table database.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Table or index name rejected before any DDL ran.
    Config(ConfigError),
    /// The file was migrated by a newer build; it is left untouched.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "wide table storage error: {err}"),
            Self::Config(err) => write!(f, "wide table configuration rejected: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "wide table schema version {db_version} is newer than this build supports ({latest_supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<ConfigError> for DbError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
