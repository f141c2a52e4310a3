//! Repository layer contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts per model area.
//! - Enforce every domain invariant inside one unit of work, before commit.
//!
//! # Invariants
//! - A failing operation leaves no partial writes behind.
//! - Repository APIs return semantic errors carrying the offending ids in
//!   addition to storage transport errors.
//! - Owned children (vertices, logs) are only reachable through their owner's id.

use crate::db::DbError;
use crate::model::geo_object::{GeometryError, LineId, ObjectId, WellId};
use crate::model::stratigraphy::UnitId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod line_repo;
pub mod object_repo;
pub mod point_repo;
pub mod strat_repo;
pub mod well_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Entity families addressable by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    GeoObject,
    Point,
    Line,
    Well,
    Unit,
    Marker,
    Property,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GeoObject => "geo object",
            Self::Point => "point",
            Self::Line => "line",
            Self::Well => "well",
            Self::Unit => "stratigraphic unit",
            Self::Marker => "well marker",
            Self::Property => "well property",
        };
        f.write_str(name)
    }
}

/// Reference to one entity, used in not-found reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

/// Coarse classification of failures for callers that branch on cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StoreUnavailable,
    SchemaMismatch,
    StoreBusy,
    InvalidGeometry,
    RankConflict,
    CyclicHierarchy,
    UnitInUse,
    NegativeDepth,
    NotFound,
    /// Rejected arguments outside the geometric/hierarchy families.
    InvalidInput,
    /// Storage failures or corrupt persisted rows.
    Internal,
}

/// Error for every repository and query operation.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidGeometry {
        object: Option<ObjectId>,
        reason: GeometryError,
    },
    RankConflict {
        line_id: LineId,
        rank: i64,
    },
    CyclicHierarchy {
        unit_id: UnitId,
        parent_id: UnitId,
    },
    UnitInUse {
        unit_id: UnitId,
        child_units: usize,
        markers: usize,
        /// Points and lines assigned to the unit as their horizon.
        geometries: usize,
    },
    NegativeDepth {
        well_id: WellId,
        depth: f64,
    },
    DepthBeyondBottom {
        well_id: WellId,
        depth: f64,
        bottom_depth: f64,
    },
    NotFound(EntityRef),
    /// No vertex occupies `rank` in the line.
    MissingVertex {
        line_id: LineId,
        rank: i64,
    },
    InvalidRange {
        what: &'static str,
        min: f64,
        max: f64,
    },
    InvalidNumber {
        what: &'static str,
        value: f64,
    },
    InvalidTag {
        object_id: ObjectId,
        key: String,
    },
    InvalidName {
        what: &'static str,
        value: String,
    },
    DuplicateName {
        what: &'static str,
        name: String,
    },
    /// Top and base of a thickness query name the same unit.
    IdenticalUnits {
        unit_id: UnitId,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Db(DbError::Unavailable { .. }) => ErrorKind::StoreUnavailable,
            Self::Db(DbError::SchemaMismatch { .. }) => ErrorKind::SchemaMismatch,
            Self::Db(DbError::Busy(_)) => ErrorKind::StoreBusy,
            Self::Db(DbError::ReadOnlyScope) => ErrorKind::InvalidInput,
            Self::Db(DbError::Sqlite(_)) | Self::InvalidData(_) => ErrorKind::Internal,
            Self::InvalidGeometry { .. } => ErrorKind::InvalidGeometry,
            Self::RankConflict { .. } => ErrorKind::RankConflict,
            Self::CyclicHierarchy { .. } => ErrorKind::CyclicHierarchy,
            Self::UnitInUse { .. } => ErrorKind::UnitInUse,
            Self::NegativeDepth { .. } => ErrorKind::NegativeDepth,
            Self::NotFound(_) | Self::MissingVertex { .. } => ErrorKind::NotFound,
            Self::DepthBeyondBottom { .. }
            | Self::InvalidRange { .. }
            | Self::InvalidNumber { .. }
            | Self::InvalidTag { .. }
            | Self::InvalidName { .. }
            | Self::DuplicateName { .. }
            | Self::IdenticalUnits { .. } => ErrorKind::InvalidInput,
        }
    }

    pub(crate) fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound(EntityRef::new(kind, id))
    }

    pub(crate) fn geometry(object: Option<ObjectId>, reason: GeometryError) -> Self {
        Self::InvalidGeometry { object, reason }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidGeometry {
                object: Some(id),
                reason,
            } => write!(f, "invalid geometry for {id}: {reason}"),
            Self::InvalidGeometry {
                object: None,
                reason,
            } => write!(f, "invalid geometry: {reason}"),
            Self::RankConflict { line_id, rank } => {
                write!(f, "rank {rank} is already occupied in line {line_id}")
            }
            Self::CyclicHierarchy { unit_id, parent_id } => write!(
                f,
                "making {parent_id} the parent of unit {unit_id} would create a cycle"
            ),
            Self::UnitInUse {
                unit_id,
                child_units,
                markers,
                geometries,
            } => write!(
                f,
                "stratigraphic unit {unit_id} is still referenced by {child_units} child unit(s), {markers} marker(s) and {geometries} point(s)/line(s)"
            ),
            Self::NegativeDepth { well_id, depth } => {
                write!(f, "depth {depth} in well {well_id} is negative")
            }
            Self::DepthBeyondBottom {
                well_id,
                depth,
                bottom_depth,
            } => write!(
                f,
                "depth {depth} in well {well_id} lies below the well bottom {bottom_depth}"
            ),
            Self::NotFound(entity) => write!(f, "{} not found: {}", entity.kind, entity.id),
            Self::MissingVertex { line_id, rank } => {
                write!(f, "line {line_id} has no vertex at rank {rank}")
            }
            Self::InvalidRange { what, min, max } => {
                write!(f, "invalid {what} range: min {min} > max {max} or not finite")
            }
            Self::InvalidNumber { what, value } => {
                write!(f, "invalid {what}: {value}")
            }
            Self::InvalidTag { object_id, key } => {
                write!(f, "invalid tag key `{key}` for {object_id}")
            }
            Self::InvalidName { what, value } => write!(f, "invalid {what} name `{value}`"),
            Self::DuplicateName { what, name } => write!(f, "{what} `{name}` already exists"),
            Self::IdenticalUnits { unit_id } => {
                write!(f, "top and base unit must differ, both are {unit_id}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidGeometry { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::from(value))
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

/// Rejects NaN/infinite query bounds and inverted ranges.
pub(crate) fn ensure_range(what: &'static str, min: f64, max: f64) -> RepoResult<()> {
    if min.is_finite() && max.is_finite() && min <= max {
        return Ok(());
    }
    Err(RepoError::InvalidRange { what, min, max })
}
