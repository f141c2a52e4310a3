//! Embedded store for geological field data.
//!
//! Points, polylines, wells with marker/property logs and a stratigraphic
//! hierarchy live in one SQLite file. Every invariant is enforced here,
//! inside the unit of work that changes the data.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use config::StoreOptions;
pub use db::{DbError, DbResult, Session, SCHEMA_VERSION};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::geo_object::{
    Coordinate, Extent, GeoKind, GeoMeta, GeoObject, GeometryError, LineId, ObjectId, PointId,
    Position, Tags, WellId,
};
pub use model::line::{Line, NearestPoint};
pub use model::point::{Point, PointProperty, PropertyValue, VertexSlot};
pub use model::stratigraphy::{StratUnit, UnitId};
pub use model::well::{
    DepthOrdered, Interval, LogRecord, Marker, MarkerId, PropertyId, PropertyLog, Well,
};
pub use query::{
    HydratingCursor, LineHit, PagedCursor, QueryEngine, ThicknessOptions, ThicknessSample, WellHit,
};
pub use repo::line_repo::{LineRepository, SqliteLineRepository};
pub use repo::object_repo::{GeoObjectRepository, SqliteGeoObjectRepository};
pub use repo::point_repo::{PointRepository, SqlitePointRepository};
pub use repo::strat_repo::{SqliteStratigraphyRepository, StratigraphyRepository};
pub use repo::well_repo::{SqliteWellRepository, WellRepository};
pub use repo::{EntityKind, EntityRef, ErrorKind, RepoError, RepoResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
