//! Connection bootstrap for file and in-memory databases.
//!
//! # Invariants
//! - Returned connections have a busy timeout so concurrent writers queue
//!   instead of failing immediately.
//! - Returned connections have migrations fully applied for the given table.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::TableConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Upper bound on waiting for another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) a database file and applies pending migrations.
///
/// Each request handler should hold its own connection; connections to the
/// same file share the table and serialize writes through SQLite locking.
pub fn open_db(path: impl AsRef<Path>, config: &TableConfig) -> DbResult<Connection> {
    open_with("file", config, || Connection::open(path))
}

/// Opens a private in-memory database and applies migrations.
pub fn open_db_in_memory(config: &TableConfig) -> DbResult<Connection> {
    open_with("memory", config, Connection::open_in_memory)
}

fn open_with(
    mode: &'static str,
    config: &TableConfig,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode={mode} table={}",
        config.table_name
    );

    let result = bootstrap(config, open);

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn bootstrap(
    config: &TableConfig,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    config.validate()?;
    let mut conn = open()?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(&mut conn, config)?;
    Ok(conn)
}
