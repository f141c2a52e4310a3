//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Run the schema gate before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and the configured busy timeout.
//! - Returned connections carry exactly [`SCHEMA_VERSION`](super::SCHEMA_VERSION).

use super::schema::ensure_schema;
use super::{DbError, DbResult};
use crate::config::StoreOptions;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens (creating if absent) a SQLite store file and runs the schema gate.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub(crate) fn open_file(path: &Path, options: &StoreOptions) -> DbResult<Connection> {
    let started_at = Instant::now();
    let location = path.display().to_string();
    info!("event=db_open module=db status=start mode=file");

    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(DbError::Unavailable {
                location,
                source: err,
            });
        }
    };

    finish_bootstrap(conn, options, "file", &location, started_at)
}

/// Opens a private in-memory store with the schema installed.
pub(crate) fn open_memory(options: &StoreOptions) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(DbError::Unavailable {
                location: ":memory:".to_string(),
                source: err,
            });
        }
    };

    finish_bootstrap(conn, options, "memory", ":memory:", started_at)
}

fn finish_bootstrap(
    conn: Connection,
    options: &StoreOptions,
    mode: &str,
    location: &str,
    started_at: Instant,
) -> DbResult<Connection> {
    match bootstrap_connection(&conn, options, mode == "file") {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(classify_bootstrap_error(err, location))
        }
    }
}

fn bootstrap_connection(conn: &Connection, options: &StoreOptions, is_file: bool) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(options.busy_timeout)?;
    if is_file && options.write_ahead_log {
        // journal_mode answers with a row, so it cannot go through execute_batch.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    }
    ensure_schema(conn)?;
    Ok(())
}

/// Anything but a schema or lock problem during bootstrap means the file is unusable.
fn classify_bootstrap_error(err: DbError, location: &str) -> DbError {
    match err {
        DbError::Sqlite(source) => DbError::Unavailable {
            location: location.to_string(),
            source,
        },
        other => other,
    }
}
