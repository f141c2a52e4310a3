//! Well repository: wells and their marker/property logs.
//!
//! # Responsibility
//! - Create, move, rename and delete wells.
//! - Insert log records at their sorted position; remove them with compaction.
//! - Look up log records by depth and logs by name.
//!
//! # Invariants
//! - Per well and log kind, `sort_order` is `0..n` and follows non-decreasing
//!   depth; equal depths keep insertion order.
//! - Log records are only created through their well id.
//! - No log record lies below a set `bottom_depth`.
//! - Well names are not unique; name lookups return every match.

use super::object_repo::{delete_geo_objects, insert_geo_object, load_meta, touch};
use super::strat_repo::ensure_unit_exists;
use super::{ensure_range, parse_optional_uuid, parse_uuid, EntityKind, RepoError, RepoResult};
use crate::db::Session;
use crate::model::geo_object::{
    validate_coordinate, Coordinate, GeoKind, GeoMeta, Position, WellId,
};
use crate::model::stratigraphy::UnitId;
use crate::model::well::{
    insertion_index, merge_logs, Interval, LogRecord, Marker, MarkerId, PropertyId, PropertyLog,
    Well,
};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub(crate) const MARKER_SELECT: &str =
    "SELECT id, well_id, depth, unit_id, comment FROM well_markers";
pub(crate) const PROPERTY_SELECT: &str =
    "SELECT id, well_id, depth, name, value, uom, sort_order FROM well_properties";

/// Log tables sharing the `sort_order` discipline.
#[derive(Debug, Clone, Copy)]
enum LogTable {
    Markers,
    Properties,
}

impl LogTable {
    fn name(self) -> &'static str {
        match self {
            Self::Markers => "well_markers",
            Self::Properties => "well_properties",
        }
    }
}

pub trait WellRepository {
    /// Creates a well at `position` whose depth zero lies at elevation `top_z`.
    fn create_well(&self, position: Position, top_z: f64, meta: GeoMeta) -> RepoResult<WellId>;
    fn get_well(&self, id: WellId) -> RepoResult<Option<Well>>;
    /// Updates the wellhead position and elevation.
    fn move_well(&self, id: WellId, position: Position, top_z: f64) -> RepoResult<()>;
    /// Sets or clears the drilled depth.
    fn set_bottom_depth(&self, id: WellId, bottom_depth: Option<f64>) -> RepoResult<()>;
    /// Sets the abbreviated well name.
    fn set_short_name(&self, id: WellId, short_name: &str) -> RepoResult<()>;
    /// Wells whose name or short name equals `name`, in id order.
    fn find_wells_by_name(&self, name: &str) -> RepoResult<Vec<Well>>;
    /// Deletes a well with all of its log records.
    fn delete_well(&self, id: WellId) -> RepoResult<()>;

    /// Inserts a marker at its depth-sorted position.
    fn add_marker(
        &self,
        well_id: WellId,
        depth: f64,
        unit_id: Option<UnitId>,
    ) -> RepoResult<MarkerId>;
    fn set_marker_comment(&self, marker_id: MarkerId, comment: &str) -> RepoResult<()>;
    /// Points a marker at another unit, or clears its classification.
    fn reassign_marker(&self, marker_id: MarkerId, unit_id: Option<UnitId>) -> RepoResult<()>;
    fn remove_marker(&self, marker_id: MarkerId) -> RepoResult<()>;

    /// Inserts a measurement at its depth-sorted position.
    fn add_property(
        &self,
        well_id: WellId,
        depth: f64,
        name: &str,
        value: f64,
        uom: &str,
    ) -> RepoResult<PropertyId>;
    fn remove_property(&self, property_id: PropertyId) -> RepoResult<()>;

    fn markers(&self, well_id: WellId) -> RepoResult<Vec<Marker>>;
    fn properties(&self, well_id: WellId) -> RepoResult<Vec<PropertyLog>>;
    /// Markers and properties merged in depth order.
    fn logs(&self, well_id: WellId) -> RepoResult<Vec<LogRecord>>;
    /// Stratigraphic intervals between consecutive markers.
    fn intervals_for(&self, well_id: WellId) -> RepoResult<Vec<Interval>>;

    /// First marker (in log order) at exactly `depth`.
    fn marker_at_depth(&self, well_id: WellId, depth: f64) -> RepoResult<Option<Marker>>;
    /// First record of log `name` at exactly `depth`.
    fn property_at_depth(
        &self,
        well_id: WellId,
        name: &str,
        depth: f64,
    ) -> RepoResult<Option<PropertyLog>>;
    /// Whether the well has any record of log `name`.
    fn has_log(&self, well_id: WellId, name: &str) -> RepoResult<bool>;
    /// Records of log `name`, in depth order.
    fn property_log(&self, well_id: WellId, name: &str) -> RepoResult<Vec<PropertyLog>>;
    /// Distinct log names of a well, sorted.
    fn log_names(&self, well_id: WellId) -> RepoResult<Vec<String>>;
}

pub struct SqliteWellRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteWellRepository<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }
}

impl WellRepository for SqliteWellRepository<'_> {
    fn create_well(&self, position: Position, top_z: f64, meta: GeoMeta) -> RepoResult<WellId> {
        validate_coordinate(Coordinate::new(position.x, position.y, top_z))
            .map_err(|reason| RepoError::geometry(None, reason))?;
        let id = Uuid::new_v4();
        self.session.with_transaction(|s| {
            insert_geo_object(s.conn(), id, GeoKind::Well, &meta)?;
            s.conn().execute(
                "INSERT INTO wells (id, x, y, top_z) VALUES (?1, ?2, ?3, ?4);",
                params![id.to_string(), position.x, position.y, top_z],
            )?;
            Ok::<_, RepoError>(())
        })?;
        info!("event=well_create module=well status=ok well_id={id}");
        Ok(id)
    }

    fn get_well(&self, id: WellId) -> RepoResult<Option<Well>> {
        self.session.read(|s| load_well(s.conn(), id))
    }

    fn move_well(&self, id: WellId, position: Position, top_z: f64) -> RepoResult<()> {
        validate_coordinate(Coordinate::new(position.x, position.y, top_z))
            .map_err(|reason| RepoError::geometry(Some(id), reason))?;
        self.session.with_transaction(|s| {
            let changed = s.conn().execute(
                "UPDATE wells SET x = ?2, y = ?3, top_z = ?4 WHERE id = ?1;",
                params![id.to_string(), position.x, position.y, top_z],
            )?;
            if changed == 0 {
                return Err(RepoError::not_found(EntityKind::Well, id));
            }
            touch(s.conn(), id)
        })
    }

    fn set_bottom_depth(&self, id: WellId, bottom_depth: Option<f64>) -> RepoResult<()> {
        if let Some(depth) = bottom_depth {
            check_depth(id, depth)?;
        }
        self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_well_exists(conn, id)?;
            if let (Some(bottom), Some(deepest)) = (bottom_depth, deepest_record(conn, id)?) {
                if deepest > bottom {
                    return Err(RepoError::DepthBeyondBottom {
                        well_id: id,
                        depth: deepest,
                        bottom_depth: bottom,
                    });
                }
            }
            conn.execute(
                "UPDATE wells SET bottom_depth = ?2 WHERE id = ?1;",
                params![id.to_string(), bottom_depth],
            )?;
            touch(conn, id)
        })
    }

    fn set_short_name(&self, id: WellId, short_name: &str) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let changed = s.conn().execute(
                "UPDATE wells SET short_name = ?2 WHERE id = ?1;",
                params![id.to_string(), short_name.trim()],
            )?;
            if changed == 0 {
                return Err(RepoError::not_found(EntityKind::Well, id));
            }
            touch(s.conn(), id)
        })
    }

    fn find_wells_by_name(&self, name: &str) -> RepoResult<Vec<Well>> {
        self.session.read(|s| {
            let conn = s.conn();
            let mut stmt = conn.prepare(
                "SELECT wells.id
                 FROM wells
                 INNER JOIN geo_objects ON geo_objects.id = wells.id
                 WHERE geo_objects.name = ?1 OR wells.short_name = ?1
                 ORDER BY wells.id ASC;",
            )?;
            let mut rows = stmt.query([name])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                let text: String = row.get(0)?;
                ids.push(parse_uuid(&text, "wells.id")?);
            }
            let mut wells = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(well) = load_well(conn, id)? {
                    wells.push(well);
                }
            }
            Ok(wells)
        })
    }

    fn delete_well(&self, id: WellId) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            ensure_well_exists(s.conn(), id)?;
            delete_geo_objects(s.conn(), &[id])?;
            Ok::<_, RepoError>(())
        })?;
        info!("event=well_delete module=well status=ok well_id={id}");
        Ok(())
    }

    fn add_marker(
        &self,
        well_id: WellId,
        depth: f64,
        unit_id: Option<UnitId>,
    ) -> RepoResult<MarkerId> {
        check_depth(well_id, depth)?;
        let id = Uuid::new_v4();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_within_well(conn, well_id, depth)?;
            if let Some(unit_id) = unit_id {
                ensure_unit_exists(conn, unit_id)?;
            }
            let position = open_slot(conn, LogTable::Markers, well_id, depth)?;
            conn.execute(
                "INSERT INTO well_markers (id, well_id, depth, unit_id, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    id.to_string(),
                    well_id.to_string(),
                    depth,
                    unit_id.map(|value| value.to_string()),
                    position
                ],
            )?;
            touch(conn, well_id)
        })?;
        debug!("event=marker_add module=well status=ok well_id={well_id} marker_id={id}");
        Ok(id)
    }

    fn set_marker_comment(&self, marker_id: MarkerId, comment: &str) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let changed = s.conn().execute(
                "UPDATE well_markers SET comment = ?2 WHERE id = ?1;",
                params![marker_id.to_string(), comment],
            )?;
            if changed == 0 {
                return Err(RepoError::not_found(EntityKind::Marker, marker_id));
            }
            Ok(())
        })
    }

    fn reassign_marker(&self, marker_id: MarkerId, unit_id: Option<UnitId>) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let conn = s.conn();
            let (well_id, _) = log_slot(conn, LogTable::Markers, marker_id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Marker, marker_id))?;
            if let Some(unit_id) = unit_id {
                ensure_unit_exists(conn, unit_id)?;
            }
            conn.execute(
                "UPDATE well_markers SET unit_id = ?2 WHERE id = ?1;",
                params![marker_id.to_string(), unit_id.map(|value| value.to_string())],
            )?;
            touch(conn, well_id)
        })
    }

    fn remove_marker(&self, marker_id: MarkerId) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let conn = s.conn();
            let (well_id, sort_order) = log_slot(conn, LogTable::Markers, marker_id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Marker, marker_id))?;
            remove_log_record(conn, LogTable::Markers, marker_id, well_id, sort_order)
        })
    }

    fn add_property(
        &self,
        well_id: WellId,
        depth: f64,
        name: &str,
        value: f64,
        uom: &str,
    ) -> RepoResult<PropertyId> {
        check_depth(well_id, depth)?;
        if !value.is_finite() {
            return Err(RepoError::InvalidNumber {
                what: "property value",
                value,
            });
        }
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(RepoError::InvalidName {
                what: "property",
                value: name.to_string(),
            });
        }
        let id = Uuid::new_v4();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_within_well(conn, well_id, depth)?;
            let position = open_slot(conn, LogTable::Properties, well_id, depth)?;
            conn.execute(
                "INSERT INTO well_properties (id, well_id, depth, name, value, uom, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    id.to_string(),
                    well_id.to_string(),
                    depth,
                    trimmed,
                    value,
                    uom,
                    position
                ],
            )?;
            touch(conn, well_id)
        })?;
        debug!("event=property_add module=well status=ok well_id={well_id} property_id={id}");
        Ok(id)
    }

    fn remove_property(&self, property_id: PropertyId) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let conn = s.conn();
            let (well_id, sort_order) = log_slot(conn, LogTable::Properties, property_id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Property, property_id))?;
            remove_log_record(conn, LogTable::Properties, property_id, well_id, sort_order)
        })
    }

    fn markers(&self, well_id: WellId) -> RepoResult<Vec<Marker>> {
        self.session.read(|s| {
            ensure_well_exists(s.conn(), well_id)?;
            load_markers(s.conn(), well_id)
        })
    }

    fn properties(&self, well_id: WellId) -> RepoResult<Vec<PropertyLog>> {
        self.session.read(|s| {
            ensure_well_exists(s.conn(), well_id)?;
            load_properties(s.conn(), well_id)
        })
    }

    fn logs(&self, well_id: WellId) -> RepoResult<Vec<LogRecord>> {
        self.session.read(|s| {
            ensure_well_exists(s.conn(), well_id)?;
            let markers = load_markers(s.conn(), well_id)?;
            let properties = load_properties(s.conn(), well_id)?;
            Ok(merge_logs(&markers, &properties))
        })
    }

    fn intervals_for(&self, well_id: WellId) -> RepoResult<Vec<Interval>> {
        let well = self
            .get_well(well_id)?
            .ok_or_else(|| RepoError::not_found(EntityKind::Well, well_id))?;
        Ok(well.intervals())
    }

    fn marker_at_depth(&self, well_id: WellId, depth: f64) -> RepoResult<Option<Marker>> {
        ensure_range("depth", depth, depth)?;
        self.session.read(|s| {
            ensure_well_exists(s.conn(), well_id)?;
            let mut stmt = s.conn().prepare(&format!(
                "{MARKER_SELECT} WHERE well_id = ?1 AND depth = ?2 ORDER BY sort_order ASC LIMIT 1;"
            ))?;
            let mut rows = stmt.query(params![well_id.to_string(), depth])?;
            match rows.next()? {
                Some(row) => parse_marker_row(row).map(Some),
                None => Ok(None),
            }
        })
    }

    fn property_at_depth(
        &self,
        well_id: WellId,
        name: &str,
        depth: f64,
    ) -> RepoResult<Option<PropertyLog>> {
        ensure_range("depth", depth, depth)?;
        Ok(self
            .property_log(well_id, name)?
            .into_iter()
            .find(|property| property.depth == depth))
    }

    fn has_log(&self, well_id: WellId, name: &str) -> RepoResult<bool> {
        let well = self
            .get_well(well_id)?
            .ok_or_else(|| RepoError::not_found(EntityKind::Well, well_id))?;
        Ok(well.has_property(name.trim()))
    }

    fn property_log(&self, well_id: WellId, name: &str) -> RepoResult<Vec<PropertyLog>> {
        self.session.read(|s| {
            ensure_well_exists(s.conn(), well_id)?;
            let mut stmt = s.conn().prepare(&format!(
                "{PROPERTY_SELECT} WHERE well_id = ?1 AND name = ?2 ORDER BY sort_order ASC;"
            ))?;
            let mut rows = stmt.query(params![well_id.to_string(), name.trim()])?;
            let mut properties = Vec::new();
            while let Some(row) = rows.next()? {
                properties.push(parse_property_row(row)?);
            }
            Ok(properties)
        })
    }

    fn log_names(&self, well_id: WellId) -> RepoResult<Vec<String>> {
        let well = self
            .get_well(well_id)?
            .ok_or_else(|| RepoError::not_found(EntityKind::Well, well_id))?;
        Ok(well.log_names().into_iter().map(str::to_string).collect())
    }
}

fn check_depth(well_id: WellId, depth: f64) -> RepoResult<()> {
    if !depth.is_finite() {
        return Err(RepoError::InvalidNumber {
            what: "depth",
            value: depth,
        });
    }
    if depth < 0.0 {
        return Err(RepoError::NegativeDepth { well_id, depth });
    }
    Ok(())
}

/// Ensures the well exists and `depth` is not below its bottom.
fn ensure_within_well(conn: &Connection, well_id: WellId, depth: f64) -> RepoResult<()> {
    let bottom = bottom_depth(conn, well_id)?
        .ok_or_else(|| RepoError::not_found(EntityKind::Well, well_id))?;
    match bottom {
        Some(bottom_depth) if depth > bottom_depth => Err(RepoError::DepthBeyondBottom {
            well_id,
            depth,
            bottom_depth,
        }),
        _ => Ok(()),
    }
}

/// `None` when the well is missing, `Some(None)` without a bottom depth.
fn bottom_depth(conn: &Connection, well_id: WellId) -> RepoResult<Option<Option<f64>>> {
    let bottom = conn
        .query_row(
            "SELECT bottom_depth FROM wells WHERE id = ?1;",
            [well_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(bottom)
}

pub(crate) fn ensure_well_exists(conn: &Connection, well_id: WellId) -> RepoResult<()> {
    match bottom_depth(conn, well_id)? {
        Some(_) => Ok(()),
        None => Err(RepoError::not_found(EntityKind::Well, well_id)),
    }
}

fn deepest_record(conn: &Connection, well_id: WellId) -> RepoResult<Option<f64>> {
    let deepest = conn.query_row(
        "SELECT MAX(depth) FROM (
            SELECT depth FROM well_markers WHERE well_id = ?1
            UNION ALL
            SELECT depth FROM well_properties WHERE well_id = ?1
        );",
        [well_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(deepest)
}

/// Finds the sorted slot for `depth` and frees it by shifting later records.
fn open_slot(conn: &Connection, table: LogTable, well_id: WellId, depth: f64) -> RepoResult<i64> {
    let mut stmt = conn.prepare(&format!(
        "SELECT depth FROM {} WHERE well_id = ?1 ORDER BY sort_order ASC;",
        table.name()
    ))?;
    let mut rows = stmt.query([well_id.to_string()])?;
    let mut depths: Vec<f64> = Vec::new();
    while let Some(row) = rows.next()? {
        depths.push(row.get(0)?);
    }
    let position = insertion_index(&depths, depth) as i64;

    conn.execute(
        &format!(
            "UPDATE {}
             SET sort_order = sort_order + 1
             WHERE well_id = ?1 AND sort_order >= ?2;",
            table.name()
        ),
        params![well_id.to_string(), position],
    )?;
    Ok(position)
}

/// `(well_id, sort_order)` of one log record.
fn log_slot(conn: &Connection, table: LogTable, id: Uuid) -> RepoResult<Option<(WellId, i64)>> {
    let slot: Option<(String, i64)> = conn
        .query_row(
            &format!(
                "SELECT well_id, sort_order FROM {} WHERE id = ?1;",
                table.name()
            ),
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match slot {
        Some((well_id, sort_order)) => Ok(Some((parse_uuid(&well_id, "well_id")?, sort_order))),
        None => Ok(None),
    }
}

fn remove_log_record(
    conn: &Connection,
    table: LogTable,
    id: Uuid,
    well_id: WellId,
    sort_order: i64,
) -> RepoResult<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1;", table.name()),
        [id.to_string()],
    )?;
    conn.execute(
        &format!(
            "UPDATE {}
             SET sort_order = sort_order - 1
             WHERE well_id = ?1 AND sort_order > ?2;",
            table.name()
        ),
        params![well_id.to_string(), sort_order],
    )?;
    touch(conn, well_id)
}

pub(crate) fn load_markers(conn: &Connection, well_id: WellId) -> RepoResult<Vec<Marker>> {
    let mut stmt = conn.prepare(&format!(
        "{MARKER_SELECT} WHERE well_id = ?1 ORDER BY sort_order ASC;"
    ))?;
    let mut rows = stmt.query([well_id.to_string()])?;
    let mut markers = Vec::new();
    while let Some(row) = rows.next()? {
        markers.push(parse_marker_row(row)?);
    }
    Ok(markers)
}

pub(crate) fn load_properties(conn: &Connection, well_id: WellId) -> RepoResult<Vec<PropertyLog>> {
    let mut stmt = conn.prepare(&format!(
        "{PROPERTY_SELECT} WHERE well_id = ?1 ORDER BY sort_order ASC;"
    ))?;
    let mut rows = stmt.query([well_id.to_string()])?;
    let mut properties = Vec::new();
    while let Some(row) = rows.next()? {
        properties.push(parse_property_row(row)?);
    }
    Ok(properties)
}

pub(crate) fn load_well(conn: &Connection, id: WellId) -> RepoResult<Option<Well>> {
    let row: Option<(f64, f64, f64, Option<f64>, String)> = conn
        .query_row(
            "SELECT x, y, top_z, bottom_depth, short_name FROM wells WHERE id = ?1;",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;
    let Some((x, y, top_z, bottom_depth, short_name)) = row else {
        return Ok(None);
    };
    let meta = load_meta(conn, id)?
        .ok_or_else(|| RepoError::InvalidData(format!("well {id} has no geo_objects row")))?;
    Ok(Some(Well {
        id,
        short_name,
        position: Position::new(x, y),
        top_z,
        bottom_depth,
        markers: load_markers(conn, id)?,
        properties: load_properties(conn, id)?,
        meta,
    }))
}

pub(crate) fn parse_marker_row(row: &Row<'_>) -> RepoResult<Marker> {
    let id: String = row.get(0)?;
    let well_id: String = row.get(1)?;
    Ok(Marker {
        id: parse_uuid(&id, "well_markers.id")?,
        well_id: parse_uuid(&well_id, "well_markers.well_id")?,
        depth: row.get(2)?,
        unit_id: parse_optional_uuid(row.get(3)?, "well_markers.unit_id")?,
        comment: row.get(4)?,
    })
}

/// Parses a property row; column 6 (`sort_order`) is read by cursors only.
pub(crate) fn parse_property_row(row: &Row<'_>) -> RepoResult<PropertyLog> {
    let id: String = row.get(0)?;
    let well_id: String = row.get(1)?;
    Ok(PropertyLog {
        id: parse_uuid(&id, "well_properties.id")?,
        well_id: parse_uuid(&well_id, "well_properties.well_id")?,
        depth: row.get(2)?,
        name: row.get(3)?,
        value: row.get(4)?,
        uom: row.get(5)?,
    })
}
