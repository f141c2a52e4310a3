//! SQLite storage bootstrap and unit-of-work boundaries.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the geo store.
//! - Install the current schema into brand-new stores and refuse any other version.
//! - Provide transactional scopes shared by every repository.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - Core code never reads/writes application data before the schema check succeeds.
//! - The core never migrates an existing store.

use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;
mod session;

pub use schema::SCHEMA_VERSION;
pub use session::Session;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Backing file could not be created, opened, or is not a database.
    Unavailable {
        location: String,
        source: rusqlite::Error,
    },
    /// Store was created by a different schema version.
    SchemaMismatch { found: u32, expected: u32 },
    /// Lock wait exceeded the configured busy timeout.
    Busy(rusqlite::Error),
    /// A unit of work was started inside a read snapshot.
    ReadOnlyScope,
    Sqlite(rusqlite::Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { location, source } => {
                write!(f, "store unavailable at `{location}`: {source}")
            }
            Self::SchemaMismatch { found, expected } => write!(
                f,
                "store schema version {found} does not match supported version {expected}"
            ),
            Self::Busy(err) => write!(f, "store busy: {err}"),
            Self::ReadOnlyScope => f.write_str("writes are not allowed inside a read snapshot"),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            Self::SchemaMismatch { .. } | Self::ReadOnlyScope => None,
            Self::Busy(err) => Some(err),
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        if is_busy(&value) {
            Self::Busy(value)
        } else {
            Self::Sqlite(value)
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}
