//! Schema migrations for the wide table.
//!
//! # Invariants
//! - `version` values are strictly increasing.
//! - Pending migrations apply in one transaction and are mirrored to
//!   `PRAGMA user_version`.
//! - Table and index names come from a validated `TableConfig`.

use crate::config::TableConfig;
use crate::db::{DbError, DbResult};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    render: fn(&TableConfig) -> String,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        render: create_items_table,
    },
    Migration {
        version: 2,
        render: create_entity_kind_index,
    },
];

/// Latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection, config: &TableConfig) -> DbResult<()> {
    config.validate()?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version();
    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }
    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(&(migration.render)(config))?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

// `attributes` holds the full item as a JSON object, key attributes included;
// `entity_kind` mirrors the `EntityKind` attribute for the secondary index.
fn create_items_table(config: &TableConfig) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            pk TEXT NOT NULL,
            sk TEXT NOT NULL,
            entity_kind TEXT,
            attributes TEXT NOT NULL,
            PRIMARY KEY (pk, sk)
        ) WITHOUT ROWID;",
        table = config.table_name
    )
}

fn create_entity_kind_index(config: &TableConfig) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {index} ON {table} (entity_kind, sk);",
        index = config.index_name,
        table = config.table_name
    )
}
