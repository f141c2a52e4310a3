//! Schema installation and version gate.
//!
//! # Responsibility
//! - Install the current schema into brand-new, empty stores.
//! - Refuse stores written by any other schema version.
//!
//! # Invariants
//! - Installed schema version is mirrored to `PRAGMA user_version`.
//! - An existing store is never altered; upgrades belong to external tooling.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Schema version written and accepted by this build.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = include_str!("0001_init.sql");

/// Tables the store needs before any repository may touch it.
pub(crate) const REQUIRED_TABLES: &[&str] = &[
    "geo_objects",
    "geo_object_tags",
    "points",
    "point_properties",
    "lines",
    "strat_units",
    "wells",
    "well_markers",
    "well_properties",
];

/// Installs the schema into an empty store or checks the existing version.
pub(crate) fn ensure_schema(conn: &Connection) -> DbResult<()> {
    if current_user_version(conn)? == SCHEMA_VERSION {
        return ensure_required_tables(conn);
    }

    // Re-check under the write lock: another process may have installed it meanwhile.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let found = current_user_version(&tx)?;
    if found == SCHEMA_VERSION {
        tx.commit()?;
        return ensure_required_tables(conn);
    }
    if found != 0 || has_user_tables(&tx)? {
        return Err(DbError::SchemaMismatch {
            found,
            expected: SCHEMA_VERSION,
        });
    }

    tx.execute_batch(SCHEMA_SQL)?;
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    tx.commit()?;
    info!("event=schema_install module=db status=ok version={SCHEMA_VERSION}");
    Ok(())
}

pub(crate) fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn has_user_tables(conn: &Connection) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        );",
        [],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_required_tables(conn: &Connection) -> DbResult<()> {
    for table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            // Version stamp without the tables: treat like an unknown schema.
            return Err(DbError::SchemaMismatch {
                found: SCHEMA_VERSION,
                expected: SCHEMA_VERSION,
            });
        }
    }
    Ok(())
}
