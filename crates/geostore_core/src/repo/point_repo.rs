//! Point repository: standalone points, vertex coordinate edits and point attributes.
//!
//! # Responsibility
//! - Create, load, move and delete standalone points.
//! - Store typed point properties and stratigraphic horizon links.
//! - Share point row parsing with the line repository and query engine.
//!
//! # Invariants
//! - A vertex is never deleted here; it is removed through its line.
//! - A vertex takes its horizon from its line and is not re-assigned here.
//! - Moving a vertex re-validates and re-caches the owning line in the same unit of work.

use super::line_repo::refresh_line_geometry;
use super::object_repo::{delete_geo_objects, ids_by_name, insert_geo_object, load_meta, touch};
use super::strat_repo::ensure_unit_exists;
use super::{parse_optional_uuid, parse_uuid, EntityKind, RepoError, RepoResult};
use crate::db::Session;
use crate::model::geo_object::{
    validate_coordinate, Coordinate, GeoKind, GeoMeta, GeometryError, PointId,
};
use crate::model::point::{Point, PointProperty, PropertyValue, VertexSlot};
use crate::model::stratigraphy::UnitId;
use crate::query::ThicknessSample;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub(crate) const POINT_SELECT: &str =
    "SELECT id, x, y, z, line_id, vertex_rank, horizon_id FROM points";

const PROPERTY_SELECT: &str = "SELECT name, value_type, value, unit FROM point_properties";

/// Point row without metadata.
pub(crate) struct PointRow {
    pub id: PointId,
    pub coordinate: Coordinate,
    pub vertex: Option<VertexSlot>,
    pub horizon_id: Option<UnitId>,
}

pub trait PointRepository {
    /// Creates a standalone point.
    fn create_point(&self, coordinate: Coordinate, meta: GeoMeta) -> RepoResult<PointId>;
    /// Creates a standalone point assigned to a stratigraphic unit.
    fn create_point_with_horizon(
        &self,
        coordinate: Coordinate,
        horizon_id: Option<UnitId>,
        meta: GeoMeta,
    ) -> RepoResult<PointId>;
    /// Loads one point, standalone or vertex.
    fn get_point(&self, id: PointId) -> RepoResult<Option<Point>>;
    /// Updates coordinates; for vertices the owning line is re-validated.
    fn move_point(&self, id: PointId, coordinate: Coordinate) -> RepoResult<()>;
    /// Assigns or clears the horizon of a standalone point.
    fn set_point_horizon(&self, id: PointId, horizon_id: Option<UnitId>) -> RepoResult<()>;
    /// Deletes a standalone point.
    fn delete_point(&self, id: PointId) -> RepoResult<()>;
    /// Points (standalone and vertices) with exactly this name, in id order.
    fn find_points_by_name(&self, name: &str) -> RepoResult<Vec<Point>>;

    /// Inserts or replaces the property `name` of a point.
    fn set_point_property(
        &self,
        id: PointId,
        name: &str,
        value: PropertyValue,
        unit: &str,
    ) -> RepoResult<()>;
    fn point_property(&self, id: PointId, name: &str) -> RepoResult<Option<PointProperty>>;
    fn has_point_property(&self, id: PointId, name: &str) -> RepoResult<bool>;
    /// Removes one property; returns whether it existed.
    fn remove_point_property(&self, id: PointId, name: &str) -> RepoResult<bool>;

    /// Stores each sample as a point at the top marker with its thickness
    /// attributes, all in one unit of work.
    fn create_thickness_points(&self, samples: &[ThicknessSample]) -> RepoResult<Vec<PointId>>;
}

pub struct SqlitePointRepository<'s> {
    session: &'s Session,
}

impl<'s> SqlitePointRepository<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }
}

impl PointRepository for SqlitePointRepository<'_> {
    fn create_point(&self, coordinate: Coordinate, meta: GeoMeta) -> RepoResult<PointId> {
        self.create_point_with_horizon(coordinate, None, meta)
    }

    fn create_point_with_horizon(
        &self,
        coordinate: Coordinate,
        horizon_id: Option<UnitId>,
        meta: GeoMeta,
    ) -> RepoResult<PointId> {
        validate_coordinate(coordinate).map_err(|reason| RepoError::geometry(None, reason))?;
        let id = Uuid::new_v4();
        self.session.with_transaction(|s| {
            if let Some(horizon_id) = horizon_id {
                ensure_unit_exists(s.conn(), horizon_id)?;
            }
            insert_geo_object(s.conn(), id, GeoKind::Point, &meta)?;
            insert_point_row(s.conn(), id, coordinate, None, horizon_id)
        })?;
        info!("event=point_create module=geometry status=ok point_id={id}");
        Ok(id)
    }

    fn get_point(&self, id: PointId) -> RepoResult<Option<Point>> {
        self.session.read(|s| load_point(s.conn(), id))
    }

    fn move_point(&self, id: PointId, coordinate: Coordinate) -> RepoResult<()> {
        validate_coordinate(coordinate).map_err(|reason| RepoError::geometry(Some(id), reason))?;
        let tolerance = self.session.options().closed_tolerance;
        self.session.with_transaction(|s| {
            let row = load_point_row(s.conn(), id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Point, id))?;
            s.conn().execute(
                "UPDATE points SET x = ?2, y = ?3, z = ?4 WHERE id = ?1;",
                params![id.to_string(), coordinate.x, coordinate.y, coordinate.z],
            )?;
            touch(s.conn(), id)?;
            if let Some(slot) = row.vertex {
                refresh_line_geometry(s.conn(), slot.line_id, tolerance)?;
                touch(s.conn(), slot.line_id)?;
            }
            Ok(())
        })
    }

    fn set_point_horizon(&self, id: PointId, horizon_id: Option<UnitId>) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let conn = s.conn();
            let row = load_point_row(conn, id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Point, id))?;
            if let Some(slot) = row.vertex {
                return Err(RepoError::geometry(
                    Some(id),
                    GeometryError::OwnedVertex {
                        line_id: slot.line_id,
                    },
                ));
            }
            if let Some(horizon_id) = horizon_id {
                ensure_unit_exists(conn, horizon_id)?;
            }
            conn.execute(
                "UPDATE points SET horizon_id = ?2 WHERE id = ?1;",
                params![id.to_string(), horizon_id.map(|value| value.to_string())],
            )?;
            touch(conn, id)
        })
    }

    fn delete_point(&self, id: PointId) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let row = load_point_row(s.conn(), id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Point, id))?;
            if let Some(slot) = row.vertex {
                return Err(RepoError::geometry(
                    Some(id),
                    GeometryError::OwnedVertex {
                        line_id: slot.line_id,
                    },
                ));
            }
            delete_geo_objects(s.conn(), &[id])?;
            Ok(())
        })?;
        info!("event=point_delete module=geometry status=ok point_id={id}");
        Ok(())
    }

    fn find_points_by_name(&self, name: &str) -> RepoResult<Vec<Point>> {
        self.session.read(|s| {
            let mut points = Vec::new();
            for id in ids_by_name(s.conn(), GeoKind::Point, name)? {
                if let Some(point) = load_point(s.conn(), id)? {
                    points.push(point);
                }
            }
            Ok(points)
        })
    }

    fn set_point_property(
        &self,
        id: PointId,
        name: &str,
        value: PropertyValue,
        unit: &str,
    ) -> RepoResult<()> {
        let name = valid_property_name(name)?;
        if let PropertyValue::Float(number) = value {
            if !number.is_finite() {
                return Err(RepoError::InvalidNumber {
                    what: "point property value",
                    value: number,
                });
            }
        }
        self.session.with_transaction(|s| {
            ensure_point_exists(s.conn(), id)?;
            write_point_property(
                s.conn(),
                id,
                &PointProperty {
                    name,
                    value,
                    unit: unit.to_string(),
                },
            )?;
            touch(s.conn(), id)
        })
    }

    fn point_property(&self, id: PointId, name: &str) -> RepoResult<Option<PointProperty>> {
        self.session.read(|s| {
            ensure_point_exists(s.conn(), id)?;
            let mut stmt = s
                .conn()
                .prepare(&format!("{PROPERTY_SELECT} WHERE point_id = ?1 AND name = ?2;"))?;
            let mut rows = stmt.query(params![id.to_string(), name.trim()])?;
            match rows.next()? {
                Some(row) => parse_property_row(row).map(Some),
                None => Ok(None),
            }
        })
    }

    fn has_point_property(&self, id: PointId, name: &str) -> RepoResult<bool> {
        Ok(self.point_property(id, name)?.is_some())
    }

    fn remove_point_property(&self, id: PointId, name: &str) -> RepoResult<bool> {
        self.session.with_transaction(|s| {
            ensure_point_exists(s.conn(), id)?;
            let removed = s.conn().execute(
                "DELETE FROM point_properties WHERE point_id = ?1 AND name = ?2;",
                params![id.to_string(), name.trim()],
            )?;
            touch(s.conn(), id)?;
            Ok(removed > 0)
        })
    }

    fn create_thickness_points(&self, samples: &[ThicknessSample]) -> RepoResult<Vec<PointId>> {
        let ids = self.session.with_transaction(|s| {
            let conn = s.conn();
            let mut ids = Vec::with_capacity(samples.len());
            for sample in samples {
                let coordinate =
                    Coordinate::new(sample.position.x, sample.position.y, sample.elevation);
                validate_coordinate(coordinate)
                    .map_err(|reason| RepoError::geometry(None, reason))?;
                let id = Uuid::new_v4();
                insert_geo_object(conn, id, GeoKind::Point, &GeoMeta::default())?;
                insert_point_row(conn, id, coordinate, None, None)?;
                for property in thickness_properties(sample) {
                    write_point_property(conn, id, &property)?;
                }
                ids.push(id);
            }
            Ok::<_, RepoError>(ids)
        })?;
        info!(
            "event=thickness_points_create module=geometry status=ok points={}",
            ids.len()
        );
        Ok(ids)
    }
}

fn thickness_properties(sample: &ThicknessSample) -> Vec<PointProperty> {
    let mut properties = vec![
        PointProperty {
            name: "thickness".to_string(),
            value: PropertyValue::Float(sample.thickness),
            unit: "m".to_string(),
        },
        PointProperty {
            name: "summarised".to_string(),
            value: PropertyValue::Int(i64::from(sample.summarised)),
            unit: "bool".to_string(),
        },
        PointProperty {
            name: "multiple_markers".to_string(),
            value: PropertyValue::Int(i64::from(sample.multiple_markers)),
            unit: "bool".to_string(),
        },
    ];
    if let Some(faulted) = sample.faulted {
        properties.push(PointProperty {
            name: "faulted".to_string(),
            value: PropertyValue::Int(faulted as i64),
            unit: "count".to_string(),
        });
    }
    properties
}

fn valid_property_name(name: &str) -> RepoResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RepoError::InvalidName {
            what: "point property",
            value: name.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn write_point_property(conn: &Connection, id: PointId, property: &PointProperty) -> RepoResult<()> {
    let sql = "INSERT INTO point_properties (point_id, name, value_type, value, unit)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT (point_id, name) DO UPDATE
               SET value_type = excluded.value_type,
                   value = excluded.value,
                   unit = excluded.unit;";
    let (key, type_name) = (id.to_string(), property.value.type_name());
    match &property.value {
        PropertyValue::Int(value) => {
            conn.execute(sql, params![key, property.name, type_name, value, property.unit])?
        }
        PropertyValue::Float(value) => {
            conn.execute(sql, params![key, property.name, type_name, value, property.unit])?
        }
        PropertyValue::String(value) => {
            conn.execute(sql, params![key, property.name, type_name, value, property.unit])?
        }
    };
    Ok(())
}

fn parse_property_row(row: &Row<'_>) -> RepoResult<PointProperty> {
    let name: String = row.get(0)?;
    let value_type: String = row.get(1)?;
    let value = match value_type.as_str() {
        "int" => PropertyValue::Int(row.get(2)?),
        "float" => PropertyValue::Float(row.get(2)?),
        "string" => PropertyValue::String(row.get(2)?),
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid value type `{other}` in point_properties.value_type"
            )))
        }
    };
    Ok(PointProperty {
        name,
        value,
        unit: row.get(3)?,
    })
}

fn load_point_properties(conn: &Connection, id: PointId) -> RepoResult<Vec<PointProperty>> {
    let mut stmt = conn.prepare(&format!(
        "{PROPERTY_SELECT} WHERE point_id = ?1 ORDER BY name ASC;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut properties = Vec::new();
    while let Some(row) = rows.next()? {
        properties.push(parse_property_row(row)?);
    }
    Ok(properties)
}

fn ensure_point_exists(conn: &Connection, id: PointId) -> RepoResult<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM points WHERE id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(RepoError::not_found(EntityKind::Point, id)),
    }
}

pub(crate) fn insert_point_row(
    conn: &Connection,
    id: PointId,
    coordinate: Coordinate,
    vertex: Option<VertexSlot>,
    horizon_id: Option<UnitId>,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO points (id, x, y, z, line_id, vertex_rank, horizon_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            id.to_string(),
            coordinate.x,
            coordinate.y,
            coordinate.z,
            vertex.map(|slot| slot.line_id.to_string()),
            vertex.map(|slot| slot.rank),
            horizon_id.map(|value| value.to_string()),
        ],
    )?;
    Ok(())
}

pub(crate) fn parse_point_row(row: &Row<'_>) -> RepoResult<PointRow> {
    let id_text: String = row.get(0)?;
    let line_id = parse_optional_uuid(row.get(4)?, "points.line_id")?;
    let rank: Option<i64> = row.get(5)?;
    let vertex = match (line_id, rank) {
        (Some(line_id), Some(rank)) => Some(VertexSlot { line_id, rank }),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "point {id_text} has a partial vertex slot"
            )))
        }
    };
    Ok(PointRow {
        id: parse_uuid(&id_text, "points.id")?,
        coordinate: Coordinate::new(row.get(1)?, row.get(2)?, row.get(3)?),
        vertex,
        horizon_id: parse_optional_uuid(row.get(6)?, "points.horizon_id")?,
    })
}

pub(crate) fn load_point_row(conn: &Connection, id: PointId) -> RepoResult<Option<PointRow>> {
    let mut stmt = conn.prepare(&format!("{POINT_SELECT} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => parse_point_row(row).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn hydrate_point(conn: &Connection, row: PointRow) -> RepoResult<Point> {
    let meta = load_meta(conn, row.id)?.ok_or_else(|| {
        RepoError::InvalidData(format!("point {} has no geo_objects row", row.id))
    })?;
    Ok(Point {
        id: row.id,
        coordinate: row.coordinate,
        vertex: row.vertex,
        horizon_id: row.horizon_id,
        properties: load_point_properties(conn, row.id)?,
        meta,
    })
}

pub(crate) fn load_point(conn: &Connection, id: PointId) -> RepoResult<Option<Point>> {
    load_point_row(conn, id)?
        .map(|row| hydrate_point(conn, row))
        .transpose()
}
