//! Store session: one open connection plus its unit-of-work boundaries.
//!
//! # Responsibility
//! - Own the connection and options for one opened store.
//! - Scope writes in atomic units of work; scope reads in snapshots.
//! - Hand out repositories bound to this session.
//!
//! # Invariants
//! - The outermost unit of work is `BEGIN IMMEDIATE`, so writers are serialized.
//! - A nested unit of work joins the enclosing transaction through a savepoint;
//!   its failure undoes only its own writes, and the outer scope decides the outcome.
//! - A read snapshot never writes: opening a unit of work inside one fails
//!   with `DbError::ReadOnlyScope` instead of writing into a scope that rolls back.
//! - No state is process-global: every repository borrows a `Session`.

use super::open::{open_file, open_memory};
use super::schema::current_user_version;
use super::{DbError, DbResult};
use crate::config::StoreOptions;
use crate::query::QueryEngine;
use crate::repo::line_repo::SqliteLineRepository;
use crate::repo::object_repo::SqliteGeoObjectRepository;
use crate::repo::point_repo::SqlitePointRepository;
use crate::repo::strat_repo::SqliteStratigraphyRepository;
use crate::repo::well_repo::SqliteWellRepository;
use log::{debug, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Instant;

const NESTED_SAVEPOINT: &str = "geostore_unit";

/// An opened geo store.
///
/// A session is single-threaded; open one session per thread against the same
/// file for parallel readers.
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    options: StoreOptions,
    path: Option<PathBuf>,
    in_read_scope: Cell<bool>,
}

/// Clears the read-scope flag when the snapshot ends, also on unwind.
struct ReadScopeGuard<'a>(&'a Cell<bool>);

impl Drop for ReadScopeGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Session {
    /// Opens the store at `path` with default options, creating it if absent.
    ///
    /// # Errors
    /// - `DbError::Unavailable` when the file cannot be created/opened or is not a store.
    /// - `DbError::SchemaMismatch` when the store uses another schema version.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> DbResult<Self> {
        let options = options.normalized();
        let path = path.as_ref();
        let conn = open_file(path, &options)?;
        Ok(Self {
            conn,
            options,
            path: Some(path.to_path_buf()),
            in_read_scope: Cell::new(false),
        })
    }

    /// Opens a private in-memory store (not shared with other sessions).
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> DbResult<Self> {
        let options = options.normalized();
        let conn = open_memory(&options)?;
        Ok(Self {
            conn,
            options,
            path: None,
            in_read_scope: Cell::new(false),
        })
    }

    /// Closes the underlying connection, surfacing close failures.
    pub fn close(self) -> DbResult<()> {
        self.conn.close().map_err(|(_, err)| DbError::from(err))
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// File path of the store, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> DbResult<u32> {
        current_user_version(&self.conn)
    }

    /// Whether a unit of work or read snapshot is currently open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Whether the caller runs inside [`Session::read`].
    pub fn in_read_scope(&self) -> bool {
        self.in_read_scope.get()
    }

    /// Runs `f` as one atomic unit of work.
    ///
    /// Commits when `f` returns `Ok`, rolls back every write made inside `f`
    /// when it returns `Err`. Nested calls join the enclosing transaction.
    ///
    /// # Errors
    /// - `DbError::Busy` (converted into `E`) when the write lock cannot be taken
    ///   within the busy timeout.
    /// - `DbError::ReadOnlyScope` when called inside [`Session::read`].
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Session) -> Result<T, E>,
        E: From<DbError>,
    {
        if self.in_read_scope() {
            warn!("event=tx_begin module=db status=rejected reason=read_scope");
            return Err(DbError::ReadOnlyScope.into());
        }
        if self.in_transaction() {
            return self.with_savepoint(f);
        }

        let started_at = Instant::now();
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        match f(self) {
            Ok(value) => {
                tx.commit().map_err(DbError::from)?;
                debug!(
                    "event=tx_commit module=db status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(
                        "event=tx_rollback module=db status=error error={}",
                        rollback_err
                    );
                }
                debug!(
                    "event=tx_rollback module=db status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Runs `f` against one consistent snapshot of the store.
    ///
    /// Repository writes inside `f` fail with `DbError::ReadOnlyScope`; use
    /// [`Session::with_transaction`] for writes. Inside a unit of work `f`
    /// joins it and may read that unit's own writes.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Session) -> Result<T, E>,
        E: From<DbError>,
    {
        if self.in_transaction() {
            return f(self);
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)
            .map_err(DbError::from)?;
        self.in_read_scope.set(true);
        let result = {
            let _scope = ReadScopeGuard(&self.in_read_scope);
            f(self)
        };
        // Read-only scope: ending it either way releases the snapshot.
        if let Err(finish_err) = tx.rollback() {
            warn!(
                "event=read_finish module=db status=error error={}",
                finish_err
            );
        }
        result
    }

    fn with_savepoint<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Session) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch(&format!("SAVEPOINT {NESTED_SAVEPOINT};"))
            .map_err(DbError::from)?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {NESTED_SAVEPOINT};"))
                    .map_err(DbError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.conn.execute_batch(&format!(
                    "ROLLBACK TO {NESTED_SAVEPOINT}; RELEASE {NESTED_SAVEPOINT};"
                )) {
                    warn!(
                        "event=savepoint_rollback module=db status=error error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn objects(&self) -> SqliteGeoObjectRepository<'_> {
        SqliteGeoObjectRepository::new(self)
    }

    pub fn points(&self) -> SqlitePointRepository<'_> {
        SqlitePointRepository::new(self)
    }

    pub fn lines(&self) -> SqliteLineRepository<'_> {
        SqliteLineRepository::new(self)
    }

    pub fn units(&self) -> SqliteStratigraphyRepository<'_> {
        SqliteStratigraphyRepository::new(self)
    }

    pub fn wells(&self) -> SqliteWellRepository<'_> {
        SqliteWellRepository::new(self)
    }

    pub fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(self)
    }
}
